use super::*;
use chrono::Utc;

#[test]
fn like_sign_follows_polarity() {
    let now = Utc::now().naive_utc();
    let like = LikeEvent {
        id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
        item_id: Uuid::new_v4(),
        is_positive: true,
        created_at: now,
        updated_at: now,
    };

    assert_eq!(like.sign(), 1.0);

    let dislike = LikeEvent {
        is_positive: false,
        ..like
    };
    assert_eq!(dislike.sign(), -1.0);
}

#[test]
fn item_serializes_round_trip() {
    let now = Utc::now().naive_utc();
    let item = Item {
        id: Uuid::new_v4(),
        name: "chess club".to_string(),
        description: Some("weekly matches".to_string()),
        category_id: None,
        created_at: now,
        updated_at: now,
    };

    let json = serde_json::to_string(&item).expect("can serialize item");
    let back: Item = serde_json::from_str(&json).expect("can deserialize item");
    assert_eq!(back, item);
}
