mod common;

use api::permission::PolicyConfig;
use common::{error_code, error_field, id, TestApp};
use serde_json::json;

const MENU: &str = r#"
query($category: ID, $featured: Boolean) {
  restaurant {
    menuItems(categoryId: $category, featured: $featured) {
      id title price afterTax featured categoryId averageRating
    }
  }
}"#;

const CREATE_ITEM: &str = r#"
mutation($input: MenuItemInput!) {
  restaurant { createMenuItem(input: $input) { id title price afterTax featured } }
}"#;

const RATE: &str = r#"
mutation($item: ID!, $score: Int!) {
  restaurant { rateMenuItem(menuItemId: $item, score: $score) { score } }
}"#;

#[tokio::test]
async fn public_menu_shows_prices_with_tax() {
    let app = TestApp::new().await;
    let data = app.exec_ok(None, MENU, json!({})).await;
    let items = data["restaurant"]["menuItems"].as_array().unwrap();
    assert_eq!(items.len(), 5);

    let pasta = items.iter().find(|item| item["title"] == "Pasta").unwrap();
    assert_eq!(pasta["price"], "10.00");
    assert_eq!(pasta["afterTax"], "11.00");
    assert_eq!(pasta["averageRating"], json!(null));

    let bruschetta = items.iter().find(|item| item["title"] == "Bruschetta").unwrap();
    assert_eq!(bruschetta["afterTax"], "8.25");
}

#[tokio::test]
async fn menu_filters_by_category_and_featured() {
    let app = TestApp::new().await;
    let mains = app
        .exec_ok(None, MENU, json!({ "category": id(app.seeded.mains) }))
        .await;
    let titles: Vec<&str> = mains["restaurant"]["menuItems"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Grilled Fish", "Pasta"]);

    let featured = app.exec_ok(None, MENU, json!({ "featured": true })).await;
    let titles: Vec<&str> = featured["restaurant"]["menuItems"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Bruschetta", "Grilled Fish"]);
}

#[tokio::test]
async fn private_catalog_requires_login() {
    let app = TestApp::with_policy(PolicyConfig {
        public_catalog: false,
        allow_signup: true,
    })
    .await;
    let anonymous = app.exec_as(None, MENU, json!({})).await;
    assert_eq!(error_code(&anonymous).as_deref(), Some("UNAUTHENTICATED"));

    let data = app.exec_ok(Some(app.seeded.customer), MENU, json!({})).await;
    assert_eq!(data["restaurant"]["menuItems"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn staff_create_menu_items() {
    let app = TestApp::new().await;
    let input = json!({
        "title": "Lemon Sorbet",
        "price": "4.50",
        "featured": true,
        "categoryId": id(app.seeded.desserts),
    });

    let denied = app
        .exec_as(Some(app.seeded.customer), CREATE_ITEM, json!({ "input": input }))
        .await;
    assert_eq!(error_code(&denied).as_deref(), Some("FORBIDDEN"));

    let data = app
        .exec_ok(Some(app.seeded.manager), CREATE_ITEM, json!({ "input": input }))
        .await;
    let created = &data["restaurant"]["createMenuItem"];
    assert_eq!(created["title"], "Lemon Sorbet");
    assert_eq!(created["price"], "4.50");
    assert_eq!(created["afterTax"], "4.95");
    assert_eq!(created["featured"], true);
}

#[tokio::test]
async fn menu_item_rules_are_enforced() {
    let app = TestApp::new().await;

    let cheap = app
        .exec_as(
            Some(app.seeded.manager),
            CREATE_ITEM,
            json!({ "input": { "title": "Olives", "price": "1.99", "categoryId": id(app.seeded.starters) } }),
        )
        .await;
    assert_eq!(error_code(&cheap).as_deref(), Some("VALIDATION"));
    assert_eq!(error_field(&cheap).as_deref(), Some("price"));

    let fractional = app
        .exec_as(
            Some(app.seeded.manager),
            CREATE_ITEM,
            json!({ "input": { "title": "Olives", "price": "3.505", "categoryId": id(app.seeded.starters) } }),
        )
        .await;
    assert_eq!(error_field(&fractional).as_deref(), Some("price"));

    let duplicate = app
        .exec_as(
            Some(app.seeded.manager),
            CREATE_ITEM,
            json!({ "input": { "title": "Pasta", "price": "9.00", "categoryId": id(app.seeded.mains) } }),
        )
        .await;
    assert_eq!(error_code(&duplicate).as_deref(), Some("CONFLICT"));

    let orphan = app
        .exec_as(
            Some(app.seeded.manager),
            CREATE_ITEM,
            json!({ "input": { "title": "Olives", "price": "3.00", "categoryId": id(uuid::Uuid::new_v4()) } }),
        )
        .await;
    assert_eq!(error_code(&orphan).as_deref(), Some("NOT_FOUND"));
    assert_eq!(app.count("menu_item").await, 5);
}

#[tokio::test]
async fn referenced_category_cannot_be_deleted() {
    let app = TestApp::new().await;
    let delete = r#"mutation($id: ID!) { restaurant { deleteCategory(id: $id) } }"#;

    let blocked = app
        .exec_as(
            Some(app.seeded.manager),
            delete,
            json!({ "id": id(app.seeded.mains) }),
        )
        .await;
    assert_eq!(error_code(&blocked).as_deref(), Some("INVALID_STATE"));
    assert_eq!(app.count("category").await, 3);

    let created = app
        .exec_ok(
            Some(app.seeded.manager),
            r#"mutation { restaurant { createCategory(input: { title: "Drinks", slug: "drinks" }) { id slug } } }"#,
            json!({}),
        )
        .await;
    let drinks = created["restaurant"]["createCategory"]["id"].clone();
    let data = app
        .exec_ok(Some(app.seeded.manager), delete, json!({ "id": drinks }))
        .await;
    assert_eq!(data["restaurant"]["deleteCategory"], true);
    assert_eq!(app.count("category").await, 3);
}

#[tokio::test]
async fn ratings_average_and_replace() {
    let app = TestApp::new().await;
    let pasta = id(app.seeded.pasta);

    app.exec_ok(Some(app.seeded.customer), RATE, json!({ "item": pasta, "score": 4 }))
        .await;
    app.exec_ok(Some(app.seeded.other_customer), RATE, json!({ "item": pasta, "score": 5 }))
        .await;
    // Rating again replaces the earlier score.
    app.exec_ok(Some(app.seeded.customer), RATE, json!({ "item": pasta, "score": 2 }))
        .await;
    assert_eq!(app.count("rating").await, 2);

    let data = app
        .exec_ok(
            None,
            r#"query($id: ID!) { restaurant { menuItem(id: $id) { averageRating } } }"#,
            json!({ "id": pasta }),
        )
        .await;
    assert_eq!(data["restaurant"]["menuItem"]["averageRating"], json!(3.5));
}

#[tokio::test]
async fn ratings_are_bounded_and_customer_only() {
    let app = TestApp::new().await;
    let pasta = id(app.seeded.pasta);

    let out_of_range = app
        .exec_as(Some(app.seeded.customer), RATE, json!({ "item": pasta, "score": 6 }))
        .await;
    assert_eq!(error_code(&out_of_range).as_deref(), Some("VALIDATION"));
    assert_eq!(error_field(&out_of_range).as_deref(), Some("score"));

    let staff = app
        .exec_as(Some(app.seeded.manager), RATE, json!({ "item": pasta, "score": 3 }))
        .await;
    assert_eq!(error_code(&staff).as_deref(), Some("FORBIDDEN"));
}
