use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use postfeed::{
    Author, AuthorId, Config, FeedError, FeedStore, InteractionCoordinator, InteractionKind,
    LoadOutcome, MemorySource, Post, PostId, SourceOp,
};

fn author(n: usize) -> Author {
    Author {
        id: AuthorId(format!("user{n}")),
        display_name: format!("User {n}"),
        handle: format!("user{n}"),
        avatar_url: format!("https://i.pravatar.cc/150?img={n}"),
    }
}

fn post(id: &str, like_count: u64, liked: bool) -> Post {
    Post {
        id: PostId::from(id),
        content: format!("post {id}"),
        image_url: None,
        author: author(1),
        like_count,
        liked_by_current_user: liked,
        share_count: 0,
        shared_by_current_user: false,
        comments: Vec::new(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap(),
    }
}

fn numbered(range: std::ops::RangeInclusive<usize>) -> Vec<Post> {
    range.map(|n| post(&n.to_string(), 0, false)).collect()
}

fn feed(posts: Vec<Post>) -> (Arc<MemorySource>, Arc<FeedStore<MemorySource>>) {
    let source = Arc::new(MemorySource::new(posts));
    let store = Arc::new(FeedStore::new(source.clone(), 10));
    (source, store)
}

fn coordinator(
    store: &Arc<FeedStore<MemorySource>>,
) -> InteractionCoordinator<MemorySource> {
    InteractionCoordinator::new(store.clone(), &Config::default())
}

fn ids(store: &FeedStore<MemorySource>) -> Vec<String> {
    store.snapshot().posts.into_iter().map(|p| p.id.0).collect()
}

#[tokio::test]
async fn fifteen_posts_over_two_pages() {
    let (_, store) = feed(numbered(1..=15));

    store.load_first_page(10).await.unwrap();
    assert_eq!(store.len(), 10);
    assert!(store.has_more());

    let outcome = store.load_next_page(10).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            received: 5,
            added: 5
        }
    );
    assert!(!store.has_more());

    let expected: Vec<String> = (1..=15).map(|n| n.to_string()).collect();
    assert_eq!(ids(&store), expected);
}

#[tokio::test]
async fn overlapping_pages_never_duplicate() {
    // Page 2 starts with a repeat of the last post on page 1, the way an
    // offset feed shifts when a post is inserted upstream.
    let mut posts = numbered(1..=10);
    posts.push(post("10", 0, false));
    posts.extend(numbered(11..=25));
    let (_, store) = feed(posts);

    store.load_first_page(10).await.unwrap();
    while store.has_more() {
        store.load_next_page(10).await.unwrap();
    }

    let ids = ids(&store);
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
    let expected: Vec<String> = (1..=25).map(|n| n.to_string()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn failed_like_reverts_exactly() {
    let (source, store) = feed(vec![post("P1", 4, false)]);
    store.refresh().await.unwrap();
    let coordinator = Arc::new(coordinator(&store));
    let p1 = PostId::from("P1");

    source.pause();
    source.fail(SourceOp::Like);
    let attempt = {
        let coordinator = coordinator.clone();
        let p1 = p1.clone();
        tokio::spawn(async move { coordinator.toggle_like(&p1).await })
    };
    tokio::time::timeout(Duration::from_secs(5), source.wait_for_calls(SourceOp::Like, 1))
        .await
        .unwrap();

    let optimistic = store.get_post(&p1).unwrap();
    assert!(optimistic.liked_by_current_user);
    assert_eq!(optimistic.like_count, 5);

    source.resume();
    let err = attempt.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        FeedError::InteractionFailed {
            kind: InteractionKind::Like,
            ..
        }
    ));

    let reverted = store.get_post(&p1).unwrap();
    assert!(!reverted.liked_by_current_user);
    assert_eq!(reverted.like_count, 4);
    assert_eq!(reverted, post("P1", 4, false));
}

#[tokio::test]
async fn like_twice_is_identity() {
    let (_, store) = feed(vec![post("P1", 4, false), post("P2", 9, true)]);
    store.refresh().await.unwrap();
    let coordinator = coordinator(&store);

    for id in ["P1", "P2"] {
        let id = PostId::from(id);
        let before = store.get_post(&id).unwrap();

        let once = coordinator.toggle_like(&id).await.unwrap();
        assert_eq!(once.liked, !before.liked_by_current_user);

        coordinator.toggle_like(&id).await.unwrap();
        let after = store.get_post(&id).unwrap();
        assert_eq!(after.liked_by_current_user, before.liked_by_current_user);
        assert_eq!(after.like_count, before.like_count);
    }
}

#[tokio::test]
async fn blank_comment_touches_nothing() {
    let (source, store) = feed(vec![post("P2", 0, false)]);
    store.refresh().await.unwrap();
    let coordinator = coordinator(&store);
    let mut changes = store.subscribe();
    changes.borrow_and_update();

    for text in ["", "   ", "\n\t "] {
        let err = coordinator
            .add_comment(&PostId::from("P2"), text)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));
    }

    assert_eq!(source.calls(SourceOp::Comment), 0);
    assert!(store.get_post(&PostId::from("P2")).unwrap().comments.is_empty());
    assert!(!changes.has_changed().unwrap());
}

#[tokio::test]
async fn confirmed_comment_replaces_pending_in_place() {
    let source = Arc::new(MemorySource::new(vec![post("P2", 0, false)]).with_comment_ids_from(99));
    let store = Arc::new(FeedStore::new(source.clone(), 10));
    store.refresh().await.unwrap();
    let coordinator = Arc::new(coordinator(&store));
    let p2 = PostId::from("P2");

    source.pause();
    let attempt = {
        let coordinator = coordinator.clone();
        let p2 = p2.clone();
        tokio::spawn(async move { coordinator.add_comment(&p2, "  nice!  ").await })
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        source.wait_for_calls(SourceOp::Comment, 1),
    )
    .await
    .unwrap();

    let pending = store.get_post(&p2).unwrap().comments;
    assert_eq!(pending.len(), 1);
    assert!(pending[0].pending);
    assert!(pending[0].id.0.starts_with("temp-"));
    assert_eq!(pending[0].content, "nice!");
    assert_eq!(pending[0].author.handle, "currentuser");

    source.resume();
    let confirmed = attempt.await.unwrap().unwrap();
    assert_eq!(confirmed.id.0, "c-99");

    let comments = store.get_post(&p2).unwrap().comments;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id.0, "c-99");
    assert!(!comments[0].pending);
    assert_eq!(store.get_post(&p2).unwrap().pending_comments().count(), 0);
}

#[tokio::test]
async fn failed_comment_is_removed() {
    let (source, store) = feed(vec![post("P2", 0, false)]);
    store.refresh().await.unwrap();
    let coordinator = coordinator(&store);

    coordinator
        .add_comment(&PostId::from("P2"), "first")
        .await
        .unwrap();
    source.fail(SourceOp::Comment);
    let err = coordinator
        .add_comment(&PostId::from("P2"), "second")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FeedError::InteractionFailed {
            kind: InteractionKind::Comment,
            ..
        }
    ));

    let comments = store.get_post(&PostId::from("P2")).unwrap().comments;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].content, "first");
}

#[tokio::test]
async fn loading_comments_keeps_pending_tail() {
    let (source, store) = feed(vec![post("P3", 0, false)]);
    store.refresh().await.unwrap();
    let coordinator = Arc::new(coordinator(&store));
    let p3 = PostId::from("P3");

    coordinator.add_comment(&p3, "already there").await.unwrap();

    source.pause();
    let attempt = {
        let coordinator = coordinator.clone();
        let p3 = p3.clone();
        tokio::spawn(async move { coordinator.add_comment(&p3, "in flight").await })
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        source.wait_for_calls(SourceOp::Comment, 2),
    )
    .await
    .unwrap();
    source.resume();

    // The thread fetch may land before or after the pending comment is
    // confirmed; either way nothing is lost or doubled.
    store.load_comments(&p3).await.unwrap();
    attempt.await.unwrap().unwrap();

    let contents: Vec<String> = store
        .get_post(&p3)
        .unwrap()
        .comments
        .into_iter()
        .map(|c| c.content)
        .collect();
    assert_eq!(contents.first().map(String::as_str), Some("already there"));
    assert_eq!(
        contents.iter().filter(|c| c.as_str() == "in flight").count(),
        1
    );
}

#[tokio::test]
async fn thread_reload_before_confirm_keeps_one_copy() {
    let (source, store) = feed(vec![post("P4", 0, false)]);
    store.refresh().await.unwrap();
    let coordinator = Arc::new(coordinator(&store));
    let p4 = PostId::from("P4");

    // The server stores the comment as c-1 but its reply is held back.
    source.hold(SourceOp::Comment);
    let attempt = {
        let coordinator = coordinator.clone();
        let p4 = p4.clone();
        tokio::spawn(async move { coordinator.add_comment(&p4, "early bird").await })
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        source.wait_for_calls(SourceOp::Comment, 1),
    )
    .await
    .unwrap();

    store.load_comments(&p4).await.unwrap();
    let reloaded = store.get_post(&p4).unwrap().comments;
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded[0].id.0, "c-1");
    assert!(reloaded[1].pending);

    source.release(SourceOp::Comment);
    let confirmed = attempt.await.unwrap().unwrap();
    assert_eq!(confirmed.id.0, "c-1");

    let comments = store.get_post(&p4).unwrap().comments;
    let ids: Vec<&str> = comments.iter().map(|c| c.id.0.as_str()).collect();
    assert_eq!(ids, vec!["c-1"]);
    assert_eq!(store.get_post(&p4).unwrap().pending_comments().count(), 0);
}

#[tokio::test]
async fn refresh_picks_up_new_content() {
    let (source, store) = feed(numbered(1..=3));
    store.refresh().await.unwrap();

    source.set_posts(numbered(4..=6));
    store.refresh().await.unwrap();
    assert_eq!(ids(&store), vec!["4", "5", "6"]);
}
