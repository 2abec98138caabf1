//! Batch settlement and fulfillment handoff.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use tokio::sync::Semaphore;

use chef_core::error::GenerationError;
use chef_core::settings::{GenerationMode, Settings};
use chef_core::settlement::FulfillmentOutcome;
use chef_core::store::PlanStore;
use chef_db::models::FoodCategory;
use chef_db::queries::shopping::NewShoppingEntry;

use common::{DishScript, ScriptedGenerator};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
}

#[tokio::test]
async fn karaage_settles_while_miso_soup_times_out() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("味噌汁", "唐揚げ", "唐揚げ・味噌汁");
    generator.script_dish(
        "唐揚げ",
        DishScript::Ingredients(vec![("鶏もも肉", "300g"), ("片栗粉", "大さじ3")]),
    );
    generator.script_dish("味噌汁", DishScript::Hang);
    let mut k = common::start(generator, Settings::default());

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let names: Vec<_> = set.dishes.iter().map(String::as_str).collect();
    assert_eq!(names, vec!["味噌汁", "唐揚げ"]);

    let report = k.settlement(set.epoch).await;
    assert_eq!(report.outcome, FulfillmentOutcome::Added(2));
    assert_eq!(report.batch.failed.len(), 1);
    assert!(report.batch.failed["味噌汁"].contains("timed out"));

    let error = k.kitchen.tracker.error_for("味噌汁").unwrap();
    assert!(error.contains("timed out"), "{error}");
    assert!(!k.kitchen.tracker.is_in_flight("味噌汁"));

    let shopping = k.store.shopping().await.unwrap();
    let mut names: Vec<_> = shopping.iter().map(|e| e.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["片栗粉", "鶏もも肉"]);
    for entry in &shopping {
        assert_eq!(entry.source_label.as_deref(), Some("唐揚げ (lunch)"));
        assert!(!entry.checked);
    }
    let chicken = shopping.iter().find(|e| e.name == "鶏もも肉").unwrap();
    assert_eq!(chicken.amount_label.as_deref(), Some("300g"));

    assert_eq!(k.generator.consolidation_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(k.notifier.bodies().len(), 1);
}

#[tokio::test]
async fn settlement_fires_once_under_repeated_evaluation() {
    let generator = ScriptedGenerator::new();
    generator.push_menu(
        "納豆ご飯・味噌汁・卵焼き",
        "焼きそば・スープ・サラダ",
        "鮭の塩焼き・ほうれん草のおひたし・豆腐の味噌汁・白米",
    );
    let mut k = common::start(generator, Settings::default());

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    assert_eq!(set.dishes.len(), 10);

    // Hammer the detector while units complete.
    let mut taken = 0;
    for _ in 0..20 {
        let results = join_all((0..8).map(|_| k.kitchen.detector.evaluate())).await;
        taken += results.iter().filter(|r| r.is_some()).count();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let report = k.settlement(set.epoch).await;
    assert!(report.batch.failed.is_empty());
    assert!(taken <= 1);
    k.assert_quiet(Duration::from_millis(200)).await;
    assert_eq!(k.notifier.bodies().len(), 1);
    assert!(k.kitchen.tracker.pending_batch().is_empty());
}

#[tokio::test]
async fn errored_dish_does_not_block_its_batch() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("A", "B", "A・B");
    generator.script_dish("A", DishScript::Ingredients(vec![("にんじん", "1本")]));
    generator.script_dish("B", DishScript::Fail(GenerationError::PolicyRefused));
    let mut k = common::start(generator, Settings::default());

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(set.epoch).await;

    assert_eq!(report.outcome, FulfillmentOutcome::Added(1));
    assert!(report.batch.failed.contains_key("B"));
    let shopping = k.store.shopping().await.unwrap();
    assert_eq!(shopping.len(), 1);
    assert_eq!(shopping[0].name, "にんじん");
}

#[tokio::test]
async fn superseded_dish_cannot_settle_old_batch() {
    let gate = Arc::new(Semaphore::new(0));
    let generator = ScriptedGenerator::new();
    generator.push_menu("パン", "パスタ", "ビーフシチュー");
    generator.push_menu("おにぎり", "そば", "焼き魚");
    generator.script_dish(
        "ビーフシチュー",
        DishScript::Gated(gate.clone(), vec![("牛肉", "400g")]),
    );
    let mut k = common::start(generator, Settings::default());
    let orchestrator = k.kitchen.orchestrator.clone();

    let first = orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    assert!(k.kitchen.tracker.is_in_flight("ビーフシチュー"));

    let second = orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    assert!(second.epoch > first.epoch);
    assert!(!second.dishes.contains("ビーフシチュー"));

    let report = k.settlement(second.epoch).await;
    assert_eq!(report.batch.dishes, second.dishes);
    assert_eq!(k.store.all_plans().unwrap().len(), 3);

    // The old unit finishes long after; its plan is gone.
    gate.add_permits(1);
    for _ in 0..50 {
        if !k.kitchen.tracker.is_in_flight("ビーフシチュー") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(k.kitchen.tracker.error_for("ビーフシチュー").is_some());

    k.assert_quiet(Duration::from_millis(300)).await;
    assert_eq!(k.notifier.bodies().len(), 1);
    let shopping = k.store.shopping().await.unwrap();
    assert!(shopping.iter().all(|e| e.name != "牛肉"));
}

#[tokio::test]
async fn dish_shared_with_superseded_batch_is_regenerated_for_new_plan() {
    let gate = Arc::new(Semaphore::new(0));
    let generator = ScriptedGenerator::new();
    generator.push_menu("パン", "パスタ", "ビーフシチュー");
    generator.push_menu("おにぎり", "そば", "ビーフシチュー・サラダ");
    generator.script_dish(
        "ビーフシチュー",
        DishScript::Gated(gate.clone(), vec![("牛肉", "400g")]),
    );
    let mut k = common::start(generator, Settings::default());
    let orchestrator = k.kitchen.orchestrator.clone();

    orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let second = orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();

    // One permit for the stale unit, one for the restart on the new plan.
    gate.add_permits(2);
    let report = k.settlement(second.epoch).await;

    assert!(report.batch.failed.is_empty(), "{:?}", report.batch.failed);
    assert_eq!(k.generator.recipe_calls_for("ビーフシチュー"), 2);
    let dinner = second.plans.iter().find(|p| p.menu_text.contains("ビーフシチュー")).unwrap();
    assert!(k.store.get_recipe(dinner.id, "ビーフシチュー").await.unwrap().is_some());
    assert!(k.store.shopping().await.unwrap().iter().any(|e| e.name == "牛肉"));
}

#[tokio::test]
async fn auto_fill_off_still_notifies() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("トースト", "うどん", "カレー");
    let settings = Settings {
        auto_fill: false,
        ..Settings::default()
    };
    let mut k = common::start(generator, settings);

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(set.epoch).await;

    assert_eq!(report.outcome, FulfillmentOutcome::Skipped);
    assert!(k.store.shopping().await.unwrap().is_empty());
    assert_eq!(k.generator.consolidation_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(
        k.notifier.bodies(),
        vec!["Recipes for 3 dishes are ready. Nothing new to buy.".to_owned()]
    );
}

#[tokio::test]
async fn consolidation_failure_writes_nothing_and_keeps_recipes() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("トースト", "うどん", "カレー");
    generator.script_consolidation(Err(GenerationError::ModelUnavailable("offline".into())));
    let mut k = common::start(generator, Settings::default());

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(set.epoch).await;

    assert!(matches!(report.outcome, FulfillmentOutcome::Failed(_)));
    assert!(k.store.shopping().await.unwrap().is_empty());
    assert!(k.notifier.bodies().is_empty());
    assert_eq!(k.store.all_plans().unwrap().len(), 3);
    assert_eq!(k.store.recipe_count().unwrap(), 3);
}

#[tokio::test]
async fn shopping_write_failure_is_reported() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("トースト", "うどん", "カレー");
    let mut k = common::start(generator, Settings::default());
    k.store.fail_shopping_writes(true).unwrap();

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(set.epoch).await;

    match report.outcome {
        FulfillmentOutcome::Failed(message) => assert!(message.contains("persistence")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn crashing_unit_is_recorded_as_failure() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("トースト", "うどん", "カレー");
    generator.script_dish("カレー", DishScript::Panic);
    let mut k = common::start(generator, Settings::default());

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(set.epoch).await;

    assert_eq!(
        report.batch.failed.get("カレー").map(String::as_str),
        Some("recipe generation crashed")
    );
    assert_eq!(report.outcome, FulfillmentOutcome::Added(1));
}

#[tokio::test]
async fn all_dishes_failing_settles_with_nothing_added() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("トースト", "うどん", "カレー");
    for dish in ["トースト", "うどん", "カレー"] {
        generator.script_dish(dish, DishScript::Fail(GenerationError::Refusal(None)));
    }
    let mut k = common::start(generator, Settings::default());

    let set = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(set.epoch).await;

    assert_eq!(report.outcome, FulfillmentOutcome::Added(0));
    assert_eq!(report.batch.failed.len(), 3);
    assert_eq!(k.generator.consolidation_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(
        k.notifier.bodies(),
        vec!["Recipes for 3 dishes are ready. Nothing new to buy.".to_owned()]
    );
}

#[tokio::test]
async fn crashed_consolidation_does_not_block_later_batches() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("トースト", "うどん", "カレー");
    generator.push_menu("納豆", "そば", "鍋");
    generator.panic_next_consolidation();
    let mut k = common::start(generator, Settings::default());

    let first = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(first.epoch).await;
    assert_eq!(
        report.outcome,
        FulfillmentOutcome::Failed("fulfillment crashed".to_owned())
    );
    assert!(k.store.shopping().await.unwrap().is_empty());

    let second = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(second.epoch).await;
    assert_eq!(report.outcome, FulfillmentOutcome::Added(1));
    assert!(k.kitchen.tracker.pending_batch().is_empty());
    assert_eq!(k.notifier.bodies().len(), 1);
}

#[tokio::test]
async fn crashed_notifier_does_not_block_later_batches() {
    let generator = ScriptedGenerator::new();
    generator.push_menu("トースト", "うどん", "カレー");
    generator.push_menu("納豆", "そば", "鍋");
    let mut k = common::start(generator, Settings::default());
    k.notifier.panic_next.store(true, std::sync::atomic::Ordering::SeqCst);

    let first = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(first.epoch).await;
    assert!(matches!(report.outcome, FulfillmentOutcome::Failed(_)));

    let second = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    let report = k.settlement(second.epoch).await;
    assert_eq!(report.outcome, FulfillmentOutcome::Added(1));
    assert_eq!(k.notifier.bodies().len(), 1);
}

#[tokio::test]
async fn regenerating_during_fulfillment_drops_the_old_entries() {
    let gate = Arc::new(Semaphore::new(0));
    let generator = ScriptedGenerator::new();
    generator.push_menu("旧A", "旧B", "旧C");
    generator.push_menu("新A", "新B", "新C");
    for (dish, item) in [
        ("旧A", "旧Aの材料"),
        ("旧B", "旧Bの材料"),
        ("旧C", "旧Cの材料"),
        ("新A", "新Aの材料"),
        ("新B", "新Bの材料"),
        ("新C", "新Cの材料"),
    ] {
        generator.script_dish(dish, DishScript::Ingredients(vec![(item, "1個")]));
    }
    generator.gate_consolidation(gate.clone());
    let mut k = common::start(generator, Settings::default());
    k.store
        .add_shopping(&NewShoppingEntry {
            name: "醤油".into(),
            category: FoodCategory::Seasoning,
            count: 1,
            source_label: None,
            amount_label: None,
        })
        .unwrap();

    let old = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    k.wait_for_consolidations(1).await;

    let new = k
        .kitchen
        .orchestrator
        .generate_plan_on(today(), GenerationMode::Morning, &[], &[])
        .await
        .unwrap();
    gate.add_permits(2);

    let report = k.settlement(old.epoch).await;
    assert_eq!(report.outcome, FulfillmentOutcome::Superseded);
    let report = k.settlement(new.epoch).await;
    assert_eq!(report.outcome, FulfillmentOutcome::Added(3));

    let shopping = k.store.shopping().await.unwrap();
    let mut auto: Vec<_> = shopping
        .iter()
        .filter(|e| e.is_auto_added())
        .map(|e| e.name.as_str())
        .collect();
    auto.sort();
    assert_eq!(auto, vec!["新Aの材料", "新Bの材料", "新Cの材料"]);
    assert!(shopping.iter().any(|e| e.name == "醤油" && !e.is_auto_added()));
    assert_eq!(k.notifier.bodies().len(), 1);
}
