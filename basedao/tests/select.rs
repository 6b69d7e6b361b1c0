mod common;

use basedao::{
    bson::{Bson, doc, oid::ObjectId},
    memory::InMemoryStore,
    prelude::*,
};
use common::{ConcurrencyStore, FailingStore, RecordingStore, store_with_orders};

fn seqs(page: &PageResult<basedao::bson::Document>) -> Vec<i32> {
    page.rows.iter().map(|row| row.get_i32("seq").unwrap()).collect()
}

#[tokio::test]
async fn select_pages_with_totals() {
    let dao = Dao::new(store_with_orders(20).await);
    let by_seq = SortSpec::new().asc("seq");

    let second = dao
        .select(
            "orders",
            SelectQuery::new().sort(by_seq.clone()).page(PageRequest::new(2, 7).with_total()),
        )
        .await
        .unwrap();
    assert_eq!(seqs(&second), (7..14).collect::<Vec<_>>());
    assert_eq!(second.total, 20);
    assert!(second.has_more);

    let last = dao
        .select("orders", SelectQuery::new().sort(by_seq).page(PageRequest::new(3, 7).with_total()))
        .await
        .unwrap();
    assert_eq!(seqs(&last), (14..20).collect::<Vec<_>>());
    assert!(!last.has_more);
}

#[tokio::test]
async fn select_without_total_skips_the_count() {
    let store = RecordingStore::new(store_with_orders(20).await);
    let dao = Dao::new(store.clone());

    let page = dao
        .select("orders", SelectQuery::new().filter(Filter::eq("status", "paid")))
        .await
        .unwrap();

    assert_eq!(page.rows.len(), 10);
    assert_eq!(page.total, 0);
    assert!(!page.has_more);
    assert_eq!(store.counts(), 0);
    assert_eq!(store.finds(), vec![(Some(0), Some(10))]);
}

#[tokio::test]
async fn select_uses_configured_default_page_size() {
    let dao = Dao::with_config(
        store_with_orders(20).await,
        DaoConfig::default().with_default_page_size(4),
    );

    let page = dao.select("orders", SelectQuery::new()).await.unwrap();

    assert_eq!(page.rows.len(), 4);
    assert_eq!(page.page_size, PageSize::Limited(4));
}

#[tokio::test]
async fn select_projects_rows() {
    let dao = Dao::new(store_with_orders(3).await);

    let page = dao
        .select(
            "orders",
            SelectQuery::new()
                .sort(SortSpec::new().desc("seq"))
                .projection(Projection::new().include("seq").exclude("_id")),
        )
        .await
        .unwrap();

    assert_eq!(page.rows[0], doc! { "seq": 2 });
}

#[tokio::test]
async fn select_all_reads_in_chunks() {
    let store = RecordingStore::new(store_with_orders(2500).await);
    let dao = Dao::new(store.clone());

    let page = dao
        .select_all(
            "orders",
            SelectQuery::new().sort(SortSpec::new().asc("seq")).page(PageRequest::new(1, -1)),
        )
        .await
        .unwrap();

    assert_eq!(
        store.finds(),
        vec![(Some(0), Some(1000)), (Some(1000), Some(1000)), (Some(2000), Some(500))]
    );
    assert_eq!(store.counts(), 1);
    assert_eq!(page.total, 2500);
    assert!(!page.has_more);
    assert_eq!(seqs(&page), (0..2500).collect::<Vec<_>>());
}

#[tokio::test]
async fn select_all_bounded_page_without_count() {
    let store = RecordingStore::new(store_with_orders(23).await);
    let dao = Dao::with_config(store.clone(), DaoConfig::default().with_chunk_size(4));

    let page = dao
        .select_all(
            "orders",
            SelectQuery::new().sort(SortSpec::new().asc("seq")).page(PageRequest::new(2, 10)),
        )
        .await
        .unwrap();

    assert_eq!(store.counts(), 0);
    assert_eq!(
        store.finds(),
        vec![(Some(10), Some(4)), (Some(14), Some(4)), (Some(18), Some(2))]
    );
    assert_eq!(seqs(&page), (10..20).collect::<Vec<_>>());
    assert_eq!(page.total, 10);
}

#[tokio::test]
async fn select_all_clamps_to_the_count() {
    let store = RecordingStore::new(store_with_orders(23).await);
    let dao = Dao::with_config(store.clone(), DaoConfig::default().with_chunk_size(4));

    let page = dao
        .select_all(
            "orders",
            SelectQuery::new()
                .sort(SortSpec::new().asc("seq"))
                .page(PageRequest::new(3, 10).with_total()),
        )
        .await
        .unwrap();

    assert_eq!(store.finds(), vec![(Some(20), Some(3))]);
    assert_eq!(seqs(&page), vec![20, 21, 22]);
    assert_eq!(page.total, 23);
    assert!(!page.has_more);
}

#[tokio::test]
async fn select_all_bounds_chunks_in_flight() {
    let store = ConcurrencyStore::new(store_with_orders(100).await);
    let dao = Dao::with_config(
        store.clone(),
        DaoConfig::default().with_chunk_size(10).with_max_concurrent_chunks(3),
    );

    let page = dao
        .select_all(
            "orders",
            SelectQuery::new().sort(SortSpec::new().asc("seq")).page(PageRequest::unbounded()),
        )
        .await
        .unwrap();

    assert_eq!(seqs(&page), (0..100).collect::<Vec<_>>());
    assert!(store.peak() > 1, "chunks were fetched one at a time");
    assert!(store.peak() <= 3, "{} chunks in flight", store.peak());
}

#[tokio::test]
async fn select_all_single_chunk_in_flight() {
    let store = ConcurrencyStore::new(store_with_orders(30).await);
    let dao = Dao::with_config(
        store.clone(),
        DaoConfig::default().with_chunk_size(10).with_max_concurrent_chunks(1),
    );

    let page = dao.select_all("orders", SelectQuery::new().page(PageRequest::unbounded())).await.unwrap();

    assert_eq!(page.rows.len(), 30);
    assert_eq!(store.peak(), 1);
}

#[tokio::test]
async fn select_all_fails_whole_when_a_chunk_fails() {
    let store = FailingStore { inner: store_with_orders(2500).await, fail_at: 1000 };
    let dao = Dao::new(store);

    let err = dao
        .select_all("orders", SelectQuery::new().page(PageRequest::unbounded()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Store);
}

#[tokio::test]
async fn invalid_filters_never_reach_the_store() {
    let store = RecordingStore::new(store_with_orders(3).await);
    let dao = Dao::new(store.clone());

    let err = dao
        .select("orders", SelectQuery::new().filter(Filter::eq("$where", 1)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(store.finds().is_empty());
}

#[tokio::test]
async fn find_by_where_returns_first_sorted_match() {
    let dao = Dao::new(store_with_orders(20).await);

    let top = dao
        .find_by_where(
            "orders",
            Filter::eq("status", "open"),
            Some(SortSpec::new().desc("amount")),
            None,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(top.get_i32("seq").unwrap(), 19);

    let none = dao
        .find_by_where("orders", Filter::eq("status", "void"), None, None)
        .await
        .unwrap();
    assert!(none.is_none());

    let err = dao.find_by_where("orders", Expr::default(), None, None).await.unwrap_err();
    assert!(matches!(err, DaoError::EmptyPredicate("find_by_where")));
}

#[tokio::test]
async fn find_list_by_where_matches_case_insensitively() {
    let dao = Dao::new(InMemoryStore::new());
    dao.adds(
        "users",
        vec![doc! { "name": "Alice" }, doc! { "name": "alina" }, doc! { "name": "Bob" }],
        true,
    )
    .await
    .unwrap();

    let rows = dao
        .find_list_by_where("users", Filter::starts_with("name", "AL"), None, None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let rows = dao
        .find_list_by_where("users", Filter::eq("name", "Carol"), None, None)
        .await
        .unwrap();
    assert!(rows.is_empty());

    let err = dao
        .find_list_by_where("users", Expr::default(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::EmptyPredicate("find_list_by_where")));
}

#[tokio::test]
async fn find_by_id_accepts_object_and_string_ids() {
    let dao = Dao::new(InMemoryStore::new());
    let assigned = dao.add("users", doc! { "name": "ada" }, true).await.unwrap();
    let supplied = ObjectId::new();
    dao.adds("users", vec![doc! { "_id": supplied, "name": "bob" }], true).await.unwrap();
    dao.add("users", doc! { "_id": "carol-1", "name": "carol" }, true).await.unwrap();

    let Bson::ObjectId(assigned) = assigned else { panic!("expected an object id") };
    let ada = dao.find_by_id("users", &assigned.to_hex(), None).await.unwrap().unwrap();
    assert_eq!(ada.get_str("name").unwrap(), "ada");

    let bob = dao.find_by_id("users", &supplied.to_hex(), None).await.unwrap().unwrap();
    assert_eq!(bob.get_str("name").unwrap(), "bob");

    let carol = dao
        .find_by_id("users", "carol-1", Some(Projection::new().include("name")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carol, doc! { "_id": "carol-1", "name": "carol" });

    assert!(dao.find_by_id("users", "nobody", None).await.unwrap().is_none());
}

#[tokio::test]
async fn aggregate_runs_pipelines_unchanged() {
    let dao = Dao::new(store_with_orders(20).await);

    let rows = dao
        .aggregate(
            "orders",
            Pipeline::new()
                .filter(Some(&Filter::eq("status", "paid")))
                .push(Stage::Group(Group::new().with("total", Accumulator::Sum("amount".into()))))
                .push(Stage::Count("groups".into())),
        )
        .await
        .unwrap();

    assert_eq!(rows, vec![doc! { "groups": 1 }]);
}

#[tokio::test]
async fn page_requests_round_trip_through_json() {
    let dao = Dao::new(store_with_orders(5).await);
    let page: PageRequest =
        serde_json::from_str(r#"{ "pageIndex": 2, "pageSize": 2, "wantTotal": true }"#).unwrap();

    let result = dao
        .select("orders", SelectQuery::new().sort(SortSpec::new().asc("seq")).page(page))
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["total"], 5);
    assert_eq!(json["hasMore"], true);
    assert_eq!(json["pageSize"], 2);
    assert_eq!(json["rows"][0]["seq"], 2);
}

#[tokio::test]
async fn decoded_unbounded_page_still_reads_everything() {
    let dao = Dao::new(store_with_orders(25).await);
    let page: PageRequest =
        serde_json::from_str(r#"{ "pageIndex": 1, "pageSize": -1, "wantTotal": false }"#).unwrap();

    let result = dao.select_all("orders", SelectQuery::new().page(page)).await.unwrap();

    assert_eq!(result.rows.len(), 25);
    assert_eq!(result.total, 25);
}

#[tokio::test]
async fn decoded_page_zero_reads_the_first_page() {
    let dao = Dao::new(store_with_orders(5).await);
    let page: PageRequest =
        serde_json::from_str(r#"{ "pageIndex": 0, "pageSize": 2, "wantTotal": true }"#).unwrap();

    let result = dao
        .select("orders", SelectQuery::new().sort(SortSpec::new().asc("seq")).page(page))
        .await
        .unwrap();

    assert_eq!(seqs(&result), vec![0, 1]);
    assert_eq!(result.page_index, 1);
    assert!(result.has_more);
}

#[tokio::test]
async fn zero_page_size_takes_the_configured_default() {
    let dao = Dao::with_config(
        store_with_orders(20).await,
        DaoConfig::default().with_default_page_size(4),
    );

    let explicit = dao
        .select("orders", SelectQuery::new().page(PageRequest::new(2, 0).with_total()))
        .await
        .unwrap();
    let omitted = dao.select("orders", SelectQuery::new()).await.unwrap();

    assert_eq!(explicit.rows.len(), 4);
    assert_eq!(explicit.page_size, PageSize::Limited(4));
    assert_eq!(omitted.page_size, explicit.page_size);
    assert!(explicit.has_more);
}
