//! What a non-administrator may see and change

mod common;

use common::{data, editor_grants, fixture_as};
use pretty_assertions::assert_eq;
use tabula_admin::{ColumnDefinition, ColumnMap, CsvFile, User, Value, XType};

fn editor() -> User {
    User::new(7, "ed").with_role("editor")
}

async fn editor_fixture() -> common::Fixture {
    let fx = fixture_as(editor(), editor_grants()).await;
    fx.conn
        .raw("INSERT INTO items (title, type_id) VALUES ('A', 1);")
        .await;
    fx
}

#[tokio::test]
async fn only_readable_tables_are_visible() {
    let fx = editor_fixture().await;
    assert!(!fx.db.is_admin());
    assert_eq!(fx.db.table_names().await.unwrap(), vec!["items", "types"]);
    assert!(fx.db.all_table_names().await.unwrap().contains(&"places".to_string()));
    assert!(fx.db.get_table("places").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn editor_may_update_but_not_create_or_delete() {
    let fx = editor_fixture().await;
    let table = fx.db.get_table("items").await.unwrap();
    let mut session = fx.db.change_session();

    let updated = table
        .save_record(&data(&[("title", Value::from("A2"))]), Some(&Value::Int64(1)), &mut session)
        .await
        .unwrap();
    assert_eq!(updated.get("title"), Value::from("A2"));
    let changesets = fx.db.tracker().changesets_for_record("items", &Value::Int64(1)).await.unwrap();
    assert_eq!(changesets[0].user_id, 7);

    let err = table
        .save_record(
            &data(&[("title", Value::from("B")), ("type_id", Value::Int64(1))]),
            None,
            &mut session,
        )
        .await
        .unwrap_err();
    assert!(err.is_permission());

    let err = table.delete_record(&Value::Int64(1)).await.unwrap_err();
    assert!(err.is_permission());
    assert_eq!(fx.conn.scalar("SELECT COUNT(*) FROM items").await, 1);
}

#[tokio::test]
async fn import_requires_its_own_grant() {
    let fx = editor_fixture().await;
    let table = fx.db.get_table("items").await.unwrap();
    let csv = CsvFile::parse(b"Title,Type\nB,Cat\n").unwrap();
    let map = ColumnMap::new().with("title", "Title").with("type_id", "Type");
    let mut session = fx.db.change_session();

    let err = csv.import(&table, &map, &mut session).await.unwrap_err();
    assert!(err.is_permission());
    assert_eq!(fx.conn.scalar("SELECT COUNT(*) FROM items").await, 1);
}

#[tokio::test]
async fn structure_changes_require_an_administrator() {
    let fx = editor_fixture().await;
    let mut table = fx.db.get_table("items").await.unwrap();

    let column = ColumnDefinition::new("colour", XType::TextLong);
    assert!(table.add_column(&column).await.unwrap_err().is_permission());
    assert!(table.rename("things").await.unwrap_err().is_permission());
    assert!(table.clone().drop().await.unwrap_err().is_permission());
    assert_eq!(table.name(), "items");
    assert_eq!(table.columns().await.unwrap().len(), 6);
}

#[tokio::test]
async fn with_user_switches_the_acting_user() {
    let fx = editor_fixture().await;
    let admin = fx.db.with_user(common::admin());
    assert!(admin.is_admin());
    assert!(admin.get_table("places").await.is_ok());
    assert!(fx.db.get_table("places").await.is_err());
}
