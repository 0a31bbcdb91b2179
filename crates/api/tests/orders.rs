mod common;

use common::{error_code, error_field, id, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

const ORDERS: &str = "{ restaurant { orders { id customerId deliveryCrewId status } } }";

const ASSIGN: &str = r#"
mutation($id: ID!, $crew: ID) {
  restaurant { assignDeliveryCrew(id: $id, crewId: $crew) { deliveryCrewId status } }
}"#;

const SET_STATUS: &str = r#"
mutation($id: ID!, $status: Int!) {
  restaurant { updateOrderStatus(id: $id, status: $status) { status statusCode } }
}"#;

async fn place_order(app: &TestApp, customer: Uuid, item: Uuid) -> String {
    app.exec_ok(
        Some(customer),
        r#"mutation($item: ID!) { restaurant { addToCart(menuItemId: $item, quantity: 1) { id } } }"#,
        json!({ "item": id(item) }),
    )
    .await;
    let data = app
        .exec_ok(
            Some(customer),
            "mutation { restaurant { checkout { id } } }",
            json!({}),
        )
        .await;
    data["restaurant"]["checkout"]["id"].as_str().unwrap().to_string()
}

fn order_ids(data: &Value) -> Vec<String> {
    data["restaurant"]["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|order| order["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn order_lists_are_scoped_by_role() {
    let app = TestApp::new().await;
    let tilly_order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    let sam_order = place_order(&app, app.seeded.other_customer, app.seeded.bruschetta).await;
    app.exec_ok(
        Some(app.seeded.manager),
        ASSIGN,
        json!({ "id": sam_order, "crew": id(app.seeded.crew) }),
    )
    .await;

    let tilly = app.exec_ok(Some(app.seeded.customer), ORDERS, json!({})).await;
    assert_eq!(order_ids(&tilly), vec![tilly_order.clone()]);

    let mario = app.exec_ok(Some(app.seeded.crew), ORDERS, json!({})).await;
    assert_eq!(order_ids(&mario), vec![sam_order.clone()]);

    let luigi = app.exec_ok(Some(app.seeded.other_crew), ORDERS, json!({})).await;
    assert!(order_ids(&luigi).is_empty());

    let manager = app.exec_ok(Some(app.seeded.manager), ORDERS, json!({})).await;
    let mut all = order_ids(&manager);
    all.sort();
    let mut expected = vec![tilly_order, sam_order];
    expected.sort();
    assert_eq!(all, expected);

    let anonymous = app.exec_as(None, ORDERS, json!({})).await;
    assert_eq!(error_code(&anonymous).as_deref(), Some("UNAUTHENTICATED"));
}

#[tokio::test]
async fn customers_cannot_read_other_orders() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    let response = app
        .exec_as(
            Some(app.seeded.other_customer),
            r#"query($id: ID!) { restaurant { order(id: $id) { id } } }"#,
            json!({ "id": order }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));
}

#[tokio::test]
async fn crew_assignment_requires_the_crew_role() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;

    let data = app
        .exec_ok(
            Some(app.seeded.manager),
            ASSIGN,
            json!({ "id": order, "crew": id(app.seeded.crew) }),
        )
        .await;
    assert_eq!(
        data["restaurant"]["assignDeliveryCrew"]["deliveryCrewId"],
        id(app.seeded.crew)
    );

    let customer = app
        .exec_as(
            Some(app.seeded.manager),
            ASSIGN,
            json!({ "id": order, "crew": id(app.seeded.other_customer) }),
        )
        .await;
    assert_eq!(error_code(&customer).as_deref(), Some("INVALID_STATE"));

    let missing = app
        .exec_as(
            Some(app.seeded.manager),
            ASSIGN,
            json!({ "id": order, "crew": id(Uuid::new_v4()) }),
        )
        .await;
    assert_eq!(error_code(&missing).as_deref(), Some("NOT_FOUND"));

    let unassigned = app
        .exec_ok(
            Some(app.seeded.manager),
            ASSIGN,
            json!({ "id": order, "crew": null }),
        )
        .await;
    assert_eq!(
        unassigned["restaurant"]["assignDeliveryCrew"]["deliveryCrewId"],
        json!(null)
    );
}

#[tokio::test]
async fn assigned_crew_marks_delivery() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;

    let unassigned = app
        .exec_as(Some(app.seeded.crew), SET_STATUS, json!({ "id": order, "status": 1 }))
        .await;
    assert_eq!(error_code(&unassigned).as_deref(), Some("FORBIDDEN"));

    app.exec_ok(
        Some(app.seeded.manager),
        ASSIGN,
        json!({ "id": order, "crew": id(app.seeded.crew) }),
    )
    .await;

    let other_crew = app
        .exec_as(
            Some(app.seeded.other_crew),
            SET_STATUS,
            json!({ "id": order, "status": 1 }),
        )
        .await;
    assert_eq!(error_code(&other_crew).as_deref(), Some("FORBIDDEN"));

    let data = app
        .exec_ok(Some(app.seeded.crew), SET_STATUS, json!({ "id": order, "status": 1 }))
        .await;
    let updated = &data["restaurant"]["updateOrderStatus"];
    assert_eq!(updated["status"], "DELIVERED");
    assert_eq!(updated["statusCode"], 1);
}

#[tokio::test]
async fn crew_cannot_reassign_orders() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    app.exec_ok(
        Some(app.seeded.manager),
        ASSIGN,
        json!({ "id": order, "crew": id(app.seeded.crew) }),
    )
    .await;

    let response = app
        .exec_as(
            Some(app.seeded.crew),
            ASSIGN,
            json!({ "id": order, "crew": id(app.seeded.other_crew) }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));
}

#[tokio::test]
async fn customers_cannot_change_status() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    let response = app
        .exec_as(
            Some(app.seeded.customer),
            SET_STATUS,
            json!({ "id": order, "status": 1 }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));
}

#[tokio::test]
async fn invalid_status_writes_nothing() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;

    let response = app
        .exec_as(
            Some(app.seeded.manager),
            r#"mutation($id: ID!, $crew: ID) {
              restaurant { updateOrder(id: $id, input: { status: 2, deliveryCrewId: $crew }) { id } }
            }"#,
            json!({ "id": order, "crew": id(app.seeded.crew) }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("VALIDATION"));
    assert_eq!(error_field(&response).as_deref(), Some("status"));

    let data = app
        .exec_ok(
            Some(app.seeded.manager),
            r#"query($id: ID!) { restaurant { order(id: $id) { deliveryCrewId statusCode } } }"#,
            json!({ "id": order }),
        )
        .await;
    assert_eq!(data["restaurant"]["order"]["deliveryCrewId"], json!(null));
    assert_eq!(data["restaurant"]["order"]["statusCode"], 0);
}

#[tokio::test]
async fn update_order_applies_both_fields() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    let data = app
        .exec_ok(
            Some(app.seeded.manager),
            r#"mutation($id: ID!, $crew: ID) {
              restaurant {
                updateOrder(id: $id, input: { status: 1, deliveryCrewId: $crew }) {
                  status deliveryCrewId
                }
              }
            }"#,
            json!({ "id": order, "crew": id(app.seeded.other_crew) }),
        )
        .await;
    let updated = &data["restaurant"]["updateOrder"];
    assert_eq!(updated["status"], "DELIVERED");
    assert_eq!(updated["deliveryCrewId"], id(app.seeded.other_crew));
}

#[tokio::test]
async fn delivered_orders_stay_delivered() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    app.exec_ok(
        Some(app.seeded.manager),
        SET_STATUS,
        json!({ "id": order, "status": 1 }),
    )
    .await;

    let same = app
        .exec_ok(
            Some(app.seeded.manager),
            SET_STATUS,
            json!({ "id": order, "status": 1 }),
        )
        .await;
    assert_eq!(same["restaurant"]["updateOrderStatus"]["statusCode"], 1);

    let back = app
        .exec_as(
            Some(app.seeded.manager),
            SET_STATUS,
            json!({ "id": order, "status": 0 }),
        )
        .await;
    assert_eq!(error_code(&back).as_deref(), Some("INVALID_STATE"));
}

#[tokio::test]
async fn deleting_an_order_keeps_the_purchase() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    let delete = r#"mutation($id: ID!) { restaurant { deleteOrder(id: $id) } }"#;

    let denied = app
        .exec_as(Some(app.seeded.customer), delete, json!({ "id": order }))
        .await;
    assert_eq!(error_code(&denied).as_deref(), Some("FORBIDDEN"));

    let data = app
        .exec_ok(Some(app.seeded.manager), delete, json!({ "id": order }))
        .await;
    assert_eq!(data["restaurant"]["deleteOrder"], true);
    assert_eq!(app.count("customer_order").await, 0);
    assert_eq!(app.count("purchase").await, 1);
}

#[tokio::test]
async fn foreign_status_updates_are_forbidden_before_validation() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    let response = app
        .exec_as(
            Some(app.seeded.other_customer),
            SET_STATUS,
            json!({ "id": order, "status": 2 }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("FORBIDDEN"));

    let response = app
        .exec_as(
            Some(app.seeded.manager),
            SET_STATUS,
            json!({ "id": order, "status": 2 }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("VALIDATION"));
}

#[tokio::test]
async fn anonymous_callers_cannot_discover_order_ids() {
    let app = TestApp::new().await;
    let order = place_order(&app, app.seeded.customer, app.seeded.pasta).await;
    let missing = Uuid::new_v4().to_string();

    for target in [&order, &missing] {
        let read = app
            .exec_as(
                None,
                r#"query($id: ID!) { restaurant { order(id: $id) { id } } }"#,
                json!({ "id": target }),
            )
            .await;
        assert_eq!(error_code(&read).as_deref(), Some("UNAUTHENTICATED"));

        let write = app
            .exec_as(None, SET_STATUS, json!({ "id": target, "status": 1 }))
            .await;
        assert_eq!(error_code(&write).as_deref(), Some("UNAUTHENTICATED"));

        let delete = app
            .exec_as(
                None,
                r#"mutation($id: ID!) { restaurant { deleteOrder(id: $id) } }"#,
                json!({ "id": target }),
            )
            .await;
        assert_eq!(error_code(&delete).as_deref(), Some("UNAUTHENTICATED"));
    }
    assert_eq!(app.count("customer_order").await, 1);
}
