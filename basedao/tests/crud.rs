mod common;

use basedao::{
    bson::{Bson, doc, oid::ObjectId},
    memory::InMemoryStore,
    prelude::*,
};
use common::store_with_orders;

#[tokio::test]
async fn add_stamps_insert_time() {
    let dao = Dao::new(InMemoryStore::new());

    let id = dao.add("events", doc! { "kind": "login" }, false).await.unwrap();
    let id = id.as_object_id().unwrap().to_hex();
    let stored = dao.find_by_id("events", &id, None).await.unwrap().unwrap();

    assert!(matches!(stored.get("_add_time"), Some(Bson::Int64(ms)) if *ms > 0));
    // default format: "%Y/%m/%d %H:%M:%S"
    let formatted = stored.get_str("_add_time_str").unwrap();
    assert_eq!(formatted.len(), 19);
    assert_eq!(&formatted[4..5], "/");
}

#[tokio::test]
async fn add_keeps_existing_or_suppressed_stamps() {
    let dao = Dao::new(InMemoryStore::new());

    dao.add("events", doc! { "_id": "a", "_add_time": 7_i64 }, false).await.unwrap();
    dao.add("events", doc! { "_id": "b" }, true).await.unwrap();

    let a = dao.find_by_id("events", "a", None).await.unwrap().unwrap();
    assert_eq!(a.get_i64("_add_time").unwrap(), 7);
    assert!(!a.contains_key("_add_time_str"));

    let b = dao.find_by_id("events", "b", None).await.unwrap().unwrap();
    assert!(!b.contains_key("_add_time"));
}

#[tokio::test]
async fn adds_shares_one_stamp_and_stringifies_ids() {
    let dao = Dao::new(InMemoryStore::new());
    let oid = ObjectId::new();

    let written = dao
        .adds("users", vec![doc! { "_id": oid, "name": "ada" }, doc! { "_id": 42, "name": "bob" }], false)
        .await
        .unwrap();
    assert_eq!(written, 2);

    let rows = dao
        .find_list_by_where("users", Filter::exists("name"), Some(SortSpec::new().asc("name")), None)
        .await
        .unwrap();
    assert_eq!(rows[0].get_str("_id").unwrap(), oid.to_hex());
    assert_eq!(rows[1].get_str("_id").unwrap(), "42");
    assert_eq!(rows[0].get("_add_time"), rows[1].get("_add_time"));
}

#[tokio::test]
async fn adds_of_nothing_writes_nothing() {
    let dao = Dao::new(InMemoryStore::new());

    assert_eq!(dao.adds("users", vec![], false).await.unwrap(), 0);
    assert!(dao.backend().collections().await.is_empty());
}

#[tokio::test]
async fn destructive_writes_need_a_predicate() {
    let dao = Dao::new(store_with_orders(20).await);

    let err = dao.del("orders", Expr::default()).await.unwrap_err();
    assert!(matches!(err, DaoError::EmptyPredicate("del")));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = dao.update("orders", Filter::and(Vec::<Expr>::new()), doc! { "status": "void" }).await.unwrap_err();
    assert!(matches!(err, DaoError::EmptyPredicate("update")));

    assert_eq!(dao.count("orders", Expr::default()).await.unwrap(), 20);
    assert_eq!(dao.count("orders", Filter::eq("status", "void")).await.unwrap(), 0);
}

#[tokio::test]
async fn del_and_update_touch_matches_only() {
    let dao = Dao::new(store_with_orders(20).await);

    let updated = dao
        .update("orders", Filter::eq("status", "open"), doc! { "status": "closed" })
        .await
        .unwrap();
    assert_eq!(updated, 10);

    let deleted = dao.del("orders", Filter::lt("seq", 5)).await.unwrap();
    assert_eq!(deleted, 5);
    assert_eq!(dao.count("orders", Filter::eq("status", "closed")).await.unwrap(), 8);
}

#[tokio::test]
async fn update_rejects_empty_and_operator_patches() {
    let dao = Dao::new(store_with_orders(3).await);

    let err = dao.update("orders", Filter::eq("seq", 1), doc! {}).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = dao
        .update("orders", Filter::eq("seq", 1), doc! { "$inc": { "amount": 1 } })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn update_many_upserts_by_match_field() {
    let dao = Dao::new(InMemoryStore::new());
    dao.adds("skus", vec![doc! { "code": "A", "qty": 1 }], true).await.unwrap();

    let result = dao
        .update_many(
            "skus",
            vec![
                doc! { "_id": "ignored", "code": "A", "qty": 5 },
                doc! { "code": "B", "qty": 2 },
            ],
            "code",
            true,
        )
        .await
        .unwrap();

    assert_eq!(result.matched_count, 1);
    assert_eq!(result.modified_count, 1);
    assert_eq!(result.upserted_count, 1);
    assert!(result.upserted_ids.contains_key(&1));

    let a = dao.find_by_where("skus", Filter::eq("code", "A"), None, None).await.unwrap().unwrap();
    assert_eq!(a.get_i32("qty").unwrap(), 5);
    assert_ne!(a.get("_id"), Some(&Bson::String("ignored".into())));

    let b = dao.find_by_where("skus", Filter::eq("code", "B"), None, None).await.unwrap().unwrap();
    assert_eq!(b.get_i32("qty").unwrap(), 2);
}

#[tokio::test]
async fn update_many_without_upsert_skips_unknown_keys() {
    let dao = Dao::new(InMemoryStore::new());

    let result = dao
        .update_many("skus", vec![doc! { "code": "Z", "qty": 1 }], "code", false)
        .await
        .unwrap();

    assert_eq!(result.upserted_count, 0);
    assert_eq!(dao.count("skus", Expr::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn update_many_requires_the_match_field() {
    let dao = Dao::new(InMemoryStore::new());

    let err = dao
        .update_many("skus", vec![doc! { "qty": 1 }], "code", true)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}
