//! End-to-end roster scenarios: sign-in, create, share, delete, and the
//! live partitions every affected user observes.

use folio_collab::auth::AuthService;
use folio_collab::roster::{Roster, SharePolicy};
use folio_collab::store::{RecordStore, StoreConfig};
use folio_collab::{Permission, UserIdentity};

async fn signed_in(auth: &AuthService, email: &str) -> UserIdentity {
    auth.register(email).await.unwrap();
    let session = auth.sign_in(email).await.unwrap();
    session.current_user().await.unwrap()
}

#[tokio::test]
async fn test_create_share_delete_lifecycle() {
    let store = RecordStore::open(StoreConfig::default()).unwrap();
    let roster = Roster::new(store.clone());
    let auth = AuthService::new();

    let alice = signed_in(&auth, "alice@x.com").await;
    let bob = signed_in(&auth, "bob@x.com").await;
    let carol = signed_in(&auth, "carol@x.com").await;

    // Alice creates "Spec" — visible only in her owned partition
    let d1 = roster.create(&alice, "Spec").await.unwrap();
    let mut alice_view = roster.watch(&alice).await;
    let view = alice_view.recv().await.unwrap();
    assert_eq!(view.owned.len(), 1);
    assert_eq!(view.owned[0].id, d1.id);
    assert!(view.shared_with_me.is_empty());

    // Shared read with Bob, write with Carol
    roster
        .share(&alice, d1.id, "bob@x.com", Permission::Read, SharePolicy::Reject)
        .await
        .unwrap();
    roster
        .share(&alice, d1.id, "carol@x.com", Permission::Write, SharePolicy::Reject)
        .await
        .unwrap();

    let mut bob_view = roster.watch(&bob).await;
    let view = bob_view.recv().await.unwrap();
    assert!(view.owned.is_empty());
    assert_eq!(view.shared_with_me.len(), 1);
    assert_eq!(
        view.shared_with_me[0].permission_for("bob@x.com"),
        Some(Permission::Read)
    );

    let mut carol_view = roster.watch(&carol).await;
    let view = carol_view.recv().await.unwrap();
    assert_eq!(
        view.shared_with_me[0].permission_for("carol@x.com"),
        Some(Permission::Write)
    );

    // Alice deletes — every live view loses the record
    roster.delete(&alice, d1.id).await.unwrap();
    assert!(alice_view.recv().await.unwrap().is_empty());
    assert!(bob_view.recv().await.unwrap().is_empty());
    assert!(carol_view.recv().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_live_view_tracks_later_shares() {
    let store = RecordStore::open(StoreConfig::default()).unwrap();
    let roster = Roster::new(store);

    let alice = UserIdentity::new("alice@x.com");
    let bob = UserIdentity::new("bob@x.com");

    let mut bob_view = roster.watch(&bob).await;
    assert!(bob_view.recv().await.unwrap().is_empty());

    // Creation Bob can't see yet still re-evaluates his partition
    let doc = roster.create(&alice, "Draft").await.unwrap();
    assert!(bob_view.recv().await.unwrap().is_empty());

    roster
        .share(&alice, doc.id, "bob@x.com", Permission::Read, SharePolicy::Reject)
        .await
        .unwrap();
    let view = bob_view.recv().await.unwrap();
    assert_eq!(view.shared_with_me.len(), 1);
}

#[tokio::test]
async fn test_signed_out_user_denied_without_crash() {
    let store = RecordStore::open(StoreConfig::default()).unwrap();
    let roster = Roster::new(store);
    let auth = AuthService::new();

    auth.register("alice@x.com").await.unwrap();
    let session = auth.sign_in("alice@x.com").await.unwrap();
    let alice = session.current_user().await.unwrap();
    let doc = roster.create(&alice, "Spec").await.unwrap();

    session.sign_out().await;
    // The gate reports no user; callers must not reach for document ops
    assert!(session.current_user().await.is_none());

    // The record itself is untouched by the sign-out
    let mut view = roster.watch(&alice).await;
    assert_eq!(view.recv().await.unwrap().owned.len(), 1);
    // No further snapshot is pending
    assert!(futures_util::FutureExt::now_or_never(view.recv()).is_none());
    let _ = doc;
}

#[tokio::test]
async fn test_multiple_documents_partition_atomically() {
    let store = RecordStore::open(StoreConfig::default()).unwrap();
    let roster = Roster::new(store);

    let alice = UserIdentity::new("alice@x.com");
    let bob = UserIdentity::new("bob@x.com");

    for i in 0..3 {
        roster.create(&alice, &format!("Mine {i}")).await.unwrap();
    }
    let shared = roster.create(&bob, "Theirs").await.unwrap();
    roster
        .share(&bob, shared.id, "alice@x.com", Permission::Write, SharePolicy::Reject)
        .await
        .unwrap();
    roster.create(&bob, "Invisible").await.unwrap();

    let mut sub = roster.watch(&alice).await;
    let view = sub.recv().await.unwrap();
    assert_eq!(view.owned.len(), 3);
    assert_eq!(view.shared_with_me.len(), 1);
    assert_eq!(view.len(), 4);

    // Disjoint: no id appears in both halves
    for rec in &view.owned {
        assert!(view.shared_with_me.iter().all(|s| s.id != rec.id));
    }
}
