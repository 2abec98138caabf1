//! Inventory, shopping list and history persistence.

use chrono::NaiveDate;

use chef_db::models::{FoodCategory, MealSlot};
use chef_db::queries::inventory::{self, NewInventoryItem};
use chef_db::queries::shopping::{self, NewShoppingEntry};
use chef_db::queries::history;
use chef_test_utils::TestDb;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn entry(name: &str, source: Option<&str>) -> NewShoppingEntry {
    NewShoppingEntry {
        name: name.to_owned(),
        category: FoodCategory::Other,
        count: 1,
        source_label: source.map(str::to_owned),
        amount_label: None,
    }
}

#[tokio::test]
async fn inventory_lists_by_expiry() {
    let db = TestDb::create().await;

    for (name, expiry) in [("米", None), ("牛乳", Some(day(5))), ("豆腐", Some(day(3)))] {
        inventory::insert_item(
            &db.pool,
            &NewInventoryItem {
                name,
                category: FoodCategory::Other,
                expiry,
                count: 1,
            },
        )
        .await
        .unwrap();
    }

    let names: Vec<_> = inventory::list_items(&db.pool)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["豆腐", "牛乳", "米"]);

    let expiring = inventory::list_expiring(&db.pool, day(4)).await.unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].name, "豆腐");

    let negative = NewInventoryItem {
        name: "卵",
        category: FoodCategory::Egg,
        expiry: None,
        count: -1,
    };
    assert!(inventory::insert_item(&db.pool, &negative).await.is_err());

    db.cleanup().await;
}

#[tokio::test]
async fn delete_auto_added_keeps_manual_entries() {
    let db = TestDb::create().await;

    shopping::insert_entry(&db.pool, &entry("トイレットペーパー", None)).await.unwrap();
    let added = shopping::insert_entries(
        &db.pool,
        &[entry("鶏もも肉", Some("唐揚げ (dinner)")), entry("味噌", Some("味噌汁 (dinner)"))],
    )
    .await
    .unwrap();
    assert_eq!(added, 2);

    assert_eq!(shopping::delete_auto_added(&db.pool).await.unwrap(), 2);
    assert_eq!(shopping::delete_auto_added(&db.pool).await.unwrap(), 0);

    let left = shopping::list_entries(&db.pool).await.unwrap();
    assert_eq!(left.len(), 1);
    assert!(!left[0].is_auto_added());

    db.cleanup().await;
}

#[tokio::test]
async fn checked_entries_sort_last() {
    let db = TestDb::create().await;

    let first = shopping::insert_entry(&db.pool, &entry("卵", None)).await.unwrap();
    shopping::insert_entry(&db.pool, &entry("パン", None)).await.unwrap();
    shopping::set_checked(&db.pool, first.id, true).await.unwrap();

    let names: Vec<_> = shopping::list_entries(&db.pool)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["パン", "卵"]);

    db.cleanup().await;
}

#[tokio::test]
async fn history_is_most_recent_first() {
    let db = TestDb::create().await;

    history::insert_history(&db.pool, day(1), MealSlot::Dinner, "カレー").await.unwrap();
    history::insert_history(&db.pool, day(3), MealSlot::Lunch, "うどん").await.unwrap();
    history::insert_history(&db.pool, day(2), MealSlot::Breakfast, "納豆ご飯").await.unwrap();

    let recent = history::list_recent(&db.pool, 2).await.unwrap();
    let menus: Vec<_> = recent.iter().map(|h| h.menu_text.as_str()).collect();
    assert_eq!(menus, vec!["うどん", "納豆ご飯"]);

    db.cleanup().await;
}

#[tokio::test]
async fn consuming_stock_stops_at_zero() {
    let db = TestDb::create().await;

    let eggs = inventory::insert_item(
        &db.pool,
        &NewInventoryItem {
            name: "卵",
            category: FoodCategory::Egg,
            expiry: None,
            count: 3,
        },
    )
    .await
    .unwrap();

    let left = inventory::consume_item(&db.pool, eggs.id, 2).await.unwrap().unwrap();
    assert_eq!(left.count, 1);
    let left = inventory::consume_item(&db.pool, eggs.id, 4).await.unwrap().unwrap();
    assert_eq!(left.count, 0);
    assert!(
        inventory::consume_item(&db.pool, uuid::Uuid::new_v4(), 1)
            .await
            .unwrap()
            .is_none()
    );

    db.cleanup().await;
}
