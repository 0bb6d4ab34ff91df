mod common;

use common::ids;

#[tokio::test]
async fn followed_posts_come_newest_first() {
    let h = common::without_index().await;
    let oleg = h.user("oleg").await;
    let masha = h.user("masha").await;
    h.app.follow(oleg.id, masha.id).await.unwrap();

    let a = h.post(&oleg, "post A").await;
    let b = h.post(&masha, "post B").await;

    let page = h.app.following_feed(oleg.id, 1, 10).await.unwrap();
    assert_eq!(ids(&page.items), vec![b.id.0, a.id.0]);
}

#[tokio::test]
async fn own_posts_appear_without_any_follows() {
    let h = common::without_index().await;
    let oleg = h.user("oleg").await;
    let mine = h.post(&oleg, "talking to myself").await;

    let page = h.app.following_feed(oleg.id, 1, 10).await.unwrap();
    assert_eq!(ids(&page.items), vec![mine.id.0]);
}

#[tokio::test]
async fn strangers_and_unfollowed_authors_are_excluded() {
    let h = common::without_index().await;
    let oleg = h.user("oleg").await;
    let masha = h.user("masha").await;
    let anna = h.user("anna").await;

    h.post(&anna, "anna is a stranger").await;
    h.app.follow(oleg.id, masha.id).await.unwrap();
    h.post(&masha, "masha was followed").await;
    h.app.unfollow(oleg.id, masha.id).await.unwrap();

    let page = h.app.following_feed(oleg.id, 1, 10).await.unwrap();
    assert!(page.items.is_empty());

    let everything = h.app.explore(1, 10).await.unwrap();
    assert_eq!(everything.items.len(), 2);
}

#[tokio::test]
async fn page_boundaries_at_n_and_n_plus_one() {
    let h = common::without_index().await;
    let oleg = h.user("oleg").await;

    let first = h.post(&oleg, "one").await;
    h.post(&oleg, "two").await;
    h.post(&oleg, "three").await;

    let page = h.app.following_feed(oleg.id, 1, 3).await.unwrap();
    assert_eq!(page.items.len(), 3);
    assert!(!page.has_next);
    assert_eq!(page.next_page(), None);

    h.post(&oleg, "four").await;

    let page = h.app.following_feed(oleg.id, 1, 3).await.unwrap();
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.next_page(), Some(2));

    let last = h.app.following_feed(oleg.id, 2, 3).await.unwrap();
    assert_eq!(ids(&last.items), vec![first.id.0]);
    assert!(!last.has_next);
    assert_eq!(last.prev_page(), Some(1));
}

#[tokio::test]
async fn user_timeline_only_has_their_posts() {
    let h = common::without_index().await;
    let oleg = h.user("oleg").await;
    let masha = h.user("masha").await;
    h.app.follow(oleg.id, masha.id).await.unwrap();

    h.post(&masha, "masha").await;
    let own = h.post(&oleg, "oleg").await;

    let page = h.app.user_posts(oleg.id, 1, 10).await.unwrap();
    assert_eq!(ids(&page.items), vec![own.id.0]);
}

#[tokio::test]
async fn deleted_posts_leave_the_feed() {
    let h = common::without_index().await;
    let oleg = h.user("oleg").await;
    let post = h.post(&oleg, "regret").await;

    assert!(h.app.delete_post(post.id).await.unwrap());
    assert!(!h.app.delete_post(post.id).await.unwrap());
    assert!(h.app.following_feed(oleg.id, 1, 10).await.unwrap().items.is_empty());
}
