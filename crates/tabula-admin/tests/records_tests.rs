//! Reading, filtering and saving records against SQLite

mod common;

use common::{data, fixture};
use pretty_assertions::assert_eq;
use tabula_admin::{Direction, FilterSpec, Operator, Value};

async fn seed_items(db: &tabula_admin::Database) {
    let table = db.get_table("items").await.unwrap();
    let mut session = db.change_session();
    for (title, type_id, note) in [
        ("A", 1, Value::Null),
        ("B", 2, Value::from("")),
        ("Cab", 2, Value::from("left by the door")),
    ] {
        table
            .save_record(
                &data(&[
                    ("title", Value::from(title)),
                    ("type_id", Value::Int64(type_id)),
                    ("note", note),
                ]),
                None,
                &mut session,
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn foreign_key_title_and_filter_through_join() {
    let fx = fixture().await;
    let mut table = fx.db.get_table("items").await.unwrap();
    let mut session = fx.db.change_session();

    let saved = table
        .save_record(
            &data(&[("title", Value::from("A")), ("type_id", Value::Int64(1))]),
            None,
            &mut session,
        )
        .await
        .unwrap();
    assert_eq!(saved.pk(), Value::Int64(1));
    table
        .save_record(
            &data(&[("title", Value::from("B")), ("type_id", Value::Int64(2))]),
            None,
            &mut session,
        )
        .await
        .unwrap();

    let record = table.get_record(&Value::Int64(1)).await.unwrap();
    assert_eq!(record.get_title("type_id", &fx.db).await.unwrap(), Value::from("Cat"));

    table.add_filter("type_id", Operator::Contains, "Ca", false).await.unwrap();
    let records = table.get_records(true, true).await.unwrap();
    let titles: Vec<Value> = records.iter().map(|r| r.get("title")).collect();
    assert_eq!(titles, vec![Value::from("A")]);

    let last = table.last_query().unwrap();
    assert!(last.sql.contains("LEFT OUTER JOIN `types` AS `f0`"), "{}", last.sql);
    assert_eq!(last.params, vec![Value::from("%Ca%")]);

    // A forced filter matches the raw id instead of the title
    table.clear_filters();
    table.add_filter("type_id", Operator::Equals, "2", true).await.unwrap();
    let records = table.get_records(false, false).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("title"), Value::from("B"));
}

#[tokio::test]
async fn contains_and_not_contains_split_the_rows() {
    let fx = fixture().await;
    seed_items(&fx.db).await;
    let mut table = fx.db.get_table("items").await.unwrap();

    table.add_filter("title", Operator::Contains, "a", false).await.unwrap();
    let matching = table.get_records(false, false).await.unwrap();
    assert!(matching.iter().all(|r| r.get("title").to_text().unwrap().to_lowercase().contains('a')));
    assert_eq!(matching.len(), 2);

    table.clear_filters();
    table.add_filter("title", Operator::NotContains, "a", false).await.unwrap();
    let others = table.get_records(false, false).await.unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].get("title"), Value::from("B"));
}

#[tokio::test]
async fn contains_matches_wildcards_literally() {
    let fx = fixture().await;
    let mut table = fx.db.get_table("notes").await.unwrap();
    let mut session = fx.db.change_session();
    for title in ["axb", "a_b", "50", "50%"] {
        table
            .save_record(&data(&[("title", Value::from(title))]), None, &mut session)
            .await
            .unwrap();
    }
    let titles = |records: Vec<tabula_admin::Record>| -> Vec<Value> {
        records.iter().map(|r| r.get("title")).collect()
    };

    table.add_filter("title", Operator::Contains, "a_b", false).await.unwrap();
    assert_eq!(titles(table.get_records(false, false).await.unwrap()), vec![Value::from("a_b")]);
    assert_eq!(table.last_query().unwrap().params, vec![Value::from("%a\\_b%")]);

    table.clear_filters();
    table.add_filter("title", Operator::Contains, "50%", false).await.unwrap();
    assert_eq!(titles(table.get_records(false, false).await.unwrap()), vec![Value::from("50%")]);

    table.clear_filters();
    table.add_filter("title", Operator::NotContains, "_", false).await.unwrap();
    assert_eq!(
        titles(table.get_records(false, false).await.unwrap()),
        vec![Value::from("axb"), Value::from("50"), Value::from("50%")]
    );
}

#[tokio::test]
async fn filter_follows_a_title_that_is_itself_a_foreign_key() {
    let fx = fixture().await;
    fx.conn
        .raw(indoc::indoc! {"
            CREATE TABLE clans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE
            );
            CREATE TABLE kinds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                clan_id INT(10) NOT NULL UNIQUE REFERENCES clans (id)
            );
            CREATE TABLE things (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label VARCHAR(20),
                kind_id INT(10) REFERENCES kinds (id)
            );
            INSERT INTO clans (name) VALUES ('North'), ('South');
            INSERT INTO kinds (clan_id) VALUES (1), (2);
            INSERT INTO things (label, kind_id) VALUES ('a', 1), ('b', 2), ('c', 1);
        "})
        .await;
    fx.db.refresh_table_names();
    let mut table = fx.db.get_table("things").await.unwrap();

    table.add_filter("kind_id", Operator::Contains, "North", false).await.unwrap();
    let mut labels: Vec<String> = table
        .get_records(false, false)
        .await
        .unwrap()
        .iter()
        .filter_map(|r| r.get("label").to_text())
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["a", "c"]);

    let last = table.last_query().unwrap();
    assert!(last.sql.contains("LEFT OUTER JOIN `kinds` AS `f0`"), "{}", last.sql);
    assert!(last.sql.contains("LEFT OUTER JOIN `clans` AS `f0_2`"), "{}", last.sql);
    assert!(last.sql.contains("`f0_2`.`name`"), "{}", last.sql);

    table.clear_filters();
    table.add_filter("kind_id", Operator::Equals, "South", false).await.unwrap();
    let records = table.get_records(false, false).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("label"), Value::from("b"));
}

#[tokio::test]
async fn empty_and_not_empty_partition_the_rows() {
    let fx = fixture().await;
    seed_items(&fx.db).await;
    let mut table = fx.db.get_table("items").await.unwrap();
    let total = table.count_records().await.unwrap();
    assert_eq!(total, 3);

    table.add_filter("note", Operator::IsEmpty, "", false).await.unwrap();
    let empty: Vec<Value> = table.get_records(false, false).await.unwrap().iter().map(|r| r.pk()).collect();

    table.clear_filters();
    table.add_filter("note", Operator::IsNotEmpty, "", false).await.unwrap();
    let not_empty: Vec<Value> = table.get_records(false, false).await.unwrap().iter().map(|r| r.pk()).collect();

    assert_eq!(empty, vec![Value::Int64(1), Value::Int64(2)]);
    assert_eq!(not_empty, vec![Value::Int64(3)]);
    assert_eq!((empty.len() + not_empty.len()) as u64, total);
}

#[tokio::test]
async fn set_membership_filters() {
    let fx = fixture().await;
    seed_items(&fx.db).await;
    let mut table = fx.db.get_table("items").await.unwrap();

    table.add_filter("title", Operator::OneOf, "A\nCab", false).await.unwrap();
    assert_eq!(table.count_records().await.unwrap(), 2);

    table.clear_filters();
    table.add_filter("title", Operator::NotOneOf, "A, Cab", false).await.unwrap();
    assert_eq!(table.count_records().await.unwrap(), 1);
}

#[tokio::test]
async fn invalid_filters_are_rejected_or_skipped() {
    let fx = fixture().await;
    let mut table = fx.db.get_table("items").await.unwrap();

    let err = table.add_filter("missing", Operator::Equals, "1", false).await.unwrap_err();
    assert!(err.is_validation());
    let err = table.add_filter("title", Operator::Equals, "  ", false).await.unwrap_err();
    assert!(err.is_validation());
    assert!(table.filters().is_empty());

    let applied = table
        .add_filters(&[
            FilterSpec::new("title", "like", "A"),
            FilterSpec::new("title", "between", "A"),
            FilterSpec::new("nope", "=", "1"),
            FilterSpec::new("note", "empty", ""),
        ])
        .await
        .unwrap();
    assert_eq!(applied, 2);
    assert_eq!(table.filters().len(), 2);
}

#[tokio::test]
async fn save_normalizes_values_for_round_trip() {
    let fx = fixture().await;
    let table = fx.db.get_table("items").await.unwrap();
    let mut session = fx.db.change_session();

    let saved = table
        .save_record(
            &data(&[
                ("title", Value::from("Boots")),
                ("type_id", Value::from("2")),
                ("active", Value::from("Yes")),
                ("weight", Value::from("")),
                ("note", Value::from("")),
            ]),
            None,
            &mut session,
        )
        .await
        .unwrap();

    let record = table.get_record(&saved.pk()).await.unwrap();
    assert_eq!(record.get("title"), Value::from("Boots"));
    assert_eq!(record.get("type_id"), Value::Int64(2));
    assert_eq!(record.get("active"), Value::Bool(true));
    assert_eq!(record.get("weight"), Value::Null);
    assert_eq!(record.get("note"), Value::from(""));

    let updated = table
        .save_record(
            &data(&[("active", Value::from("no")), ("weight", Value::from("12"))]),
            Some(&saved.pk()),
            &mut session,
        )
        .await
        .unwrap();
    assert_eq!(updated.pk(), saved.pk());
    assert_eq!(updated.get("active"), Value::Bool(false));
    assert_eq!(updated.get("weight"), Value::Int64(12));
    assert_eq!(table.count_records().await.unwrap(), 1);
}

#[tokio::test]
async fn save_rejects_bad_input_before_writing() {
    let fx = fixture().await;
    let table = fx.db.get_table("items").await.unwrap();
    let mut session = fx.db.change_session();

    let err = table
        .save_record(&data(&[("colour", Value::from("red"))]), None, &mut session)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = table
        .save_record(
            &data(&[("title", Value::from("X")), ("type_id", Value::from("one"))]),
            None,
            &mut session,
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(!session.is_open());
    assert_eq!(fx.conn.scalar("SELECT COUNT(*) FROM items").await, 0);
}

#[tokio::test]
async fn insert_over_existing_key_is_a_data_integrity_error() {
    let fx = fixture().await;
    fx.conn
        .raw("CREATE TABLE codes (code VARCHAR(10) PRIMARY KEY, label VARCHAR(50));")
        .await;
    fx.db.refresh_table_names();
    let table = fx.db.get_table("codes").await.unwrap();
    let mut session = fx.db.change_session();

    let first = table
        .save_record(
            &data(&[("code", Value::from("A")), ("label", Value::from("First"))]),
            None,
            &mut session,
        )
        .await
        .unwrap();
    assert_eq!(first.pk(), Value::from("A"));

    let err = table
        .save_record(
            &data(&[("code", Value::from("A")), ("label", Value::from("Again"))]),
            None,
            &mut session,
        )
        .await
        .unwrap_err();
    assert!(err.is_data_integrity(), "{}", err);
    assert_eq!(fx.conn.scalar("SELECT COUNT(*) FROM codes").await, 1);

    // Auto-increment keys are never written, so a supplied id is ignored
    let types = fx.db.get_table("types").await.unwrap();
    let fish = types
        .save_record(
            &data(&[("id", Value::Int64(1)), ("title", Value::from("Fish"))]),
            None,
            &mut session,
        )
        .await
        .unwrap();
    assert_eq!(fish.pk(), Value::Int64(3));
}

#[tokio::test]
async fn pagination_is_clamped_and_ordered() {
    let fx = fixture().await;
    seed_items(&fx.db).await;
    let mut table = fx.db.get_table("items").await.unwrap();
    table.set_page_size(2).unwrap();
    table.set_order("title", Direction::Desc).await.unwrap();

    assert_eq!(table.page_count().await.unwrap(), 2);
    table.set_page(9);
    let last_page = table.get_records(true, false).await.unwrap();
    assert_eq!(table.page(), 2);
    assert_eq!(last_page.len(), 1);
    assert_eq!(last_page[0].get("title"), Value::from("A"));

    table.set_page(1);
    let first_page: Vec<Value> = table.get_records(true, false).await.unwrap().iter().map(|r| r.get("title")).collect();
    assert_eq!(first_page, vec![Value::from("Cab"), Value::from("B")]);

    // Ordering by a foreign key sorts by the referenced title
    table.set_order("type_id", Direction::Asc).await.unwrap();
    table.set_page_size(10).unwrap();
    let by_type: Vec<Value> = table.get_records(true, false).await.unwrap().iter().map(|r| r.get("type_id")).collect();
    assert_eq!(by_type[0], Value::Int64(1));
    assert!(table.set_page_size(0).is_err());
}

#[tokio::test]
async fn reset_reloads_the_same_columns() {
    let fx = fixture().await;
    let table = fx.db.get_table("items").await.unwrap();

    let before = table.columns().await.unwrap();
    table.reset();
    let after = table.reload().await.unwrap();
    let after: Vec<_> = after.columns().cloned().collect();
    assert_eq!(before, after);

    let names: Vec<&str> = before.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["id", "title", "type_id", "active", "weight", "note"]);
    assert!(before[2].is_fk());
    assert!(before[3].is_boolean());
    assert!(before[1].is_required());
    assert!(!before[0].is_required());
}

#[tokio::test]
async fn table_relations_and_defaults() {
    let fx = fixture().await;
    let items = fx.db.get_table("items").await.unwrap();
    let types = fx.db.get_table("types").await.unwrap();

    assert_eq!(items.referenced_tables().await.unwrap(), vec!["types"]);
    assert_eq!(types.referencing_tables().await.unwrap(), vec!["items"]);

    let defaults = items.default_record().await.unwrap();
    assert_eq!(defaults.get("active"), Value::Bool(false));
    assert_eq!(defaults.get("title"), Value::Null);

    let view = fx.db.get_table("item_titles").await.unwrap();
    assert!(view.is_view().await.unwrap());

    let missing = fx.db.get_table("nothing").await.unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn record_titles() {
    let fx = fixture().await;
    seed_items(&fx.db).await;
    let types = fx.db.get_table("types").await.unwrap();
    let dog = types.get_record(&Value::Int64(2)).await.unwrap();
    assert_eq!(dog.title(&fx.db).await.unwrap(), "Dog");

    let items = fx.db.get_table("items").await.unwrap();
    let cab = items.get_record(&Value::Int64(3)).await.unwrap();
    assert_eq!(cab.title(&fx.db).await.unwrap(), "3");
    let referenced = cab.referenced_record("type_id", &fx.db).await.unwrap().unwrap();
    assert_eq!(referenced.get("title"), Value::from("Dog"));
}
