mod common;

use api::permission::PolicyConfig;
use common::{error_code, error_field, id, TestApp};
use serde_json::{json, Value};

const SIGN_UP: &str = r#"
mutation($input: SignUpInput!) {
  restaurant { signUp(input: $input) { id username email displayName roles } }
}"#;

const GRANT: &str = r#"
mutation($user: ID!, $role: RoleName!) {
  restaurant { grantRole(userId: $user, role: $role) { username roles } }
}"#;

const ROLE_MEMBERS: &str = r#"
query($role: RoleName!) { restaurant { roleMembers(role: $role) { username } } }"#;

fn usernames(list: &Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|user| user["username"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn sign_up_creates_a_customer_account() {
    let app = TestApp::new().await;
    let data = app
        .exec_ok(
            None,
            SIGN_UP,
            json!({ "input": { "username": "new.guest", "email": "Guest@Example.TEST" } }),
        )
        .await;
    let user = &data["restaurant"]["signUp"];
    assert_eq!(user["username"], "new.guest");
    assert_eq!(user["email"], "guest@example.test");
    assert_eq!(user["displayName"], "new.guest");
    assert_eq!(user["roles"], json!(["CUSTOMER"]));

    let again = app
        .exec_as(
            None,
            SIGN_UP,
            json!({ "input": { "username": "new.guest", "email": "other@example.test" } }),
        )
        .await;
    assert_eq!(error_code(&again).as_deref(), Some("CONFLICT"));
}

#[tokio::test]
async fn sign_up_rejects_bad_usernames() {
    let app = TestApp::new().await;
    let response = app
        .exec_as(
            None,
            SIGN_UP,
            json!({ "input": { "username": "two words", "email": "a@b.test" } }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("VALIDATION"));
    assert_eq!(error_field(&response).as_deref(), Some("username"));
}

#[tokio::test]
async fn closed_sign_up_is_denied() {
    let app = TestApp::with_policy(PolicyConfig {
        public_catalog: true,
        allow_signup: false,
    })
    .await;
    let response = app
        .exec_as(
            None,
            SIGN_UP,
            json!({ "input": { "username": "late", "email": "late@example.test" } }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("UNAUTHENTICATED"));
    assert_eq!(app.count("user").await, 6);
}

#[tokio::test]
async fn me_requires_a_session() {
    let app = TestApp::new().await;
    let query = "{ restaurant { me { username roles } } }";

    let anonymous = app.exec_as(None, query, json!({})).await;
    assert_eq!(error_code(&anonymous).as_deref(), Some("UNAUTHENTICATED"));

    let data = app
        .exec_ok(Some(app.seeded.customer), query, json!({}))
        .await;
    assert_eq!(data["restaurant"]["me"]["username"], "tilly");
}

#[tokio::test]
async fn user_directory_is_staff_only() {
    let app = TestApp::new().await;
    let query = "{ restaurant { users { username } } }";

    let denied = app.exec_as(Some(app.seeded.customer), query, json!({})).await;
    assert_eq!(error_code(&denied).as_deref(), Some("FORBIDDEN"));

    let data = app.exec_ok(Some(app.seeded.manager), query, json!({})).await;
    assert_eq!(
        usernames(&data["restaurant"]["users"]),
        vec!["admin", "adrian", "luigi", "mario", "sam", "tilly"]
    );
}

#[tokio::test]
async fn role_members_exclude_higher_roles() {
    let app = TestApp::new().await;
    let crew = app
        .exec_ok(
            Some(app.seeded.manager),
            ROLE_MEMBERS,
            json!({ "role": "DELIVERY_CREW" }),
        )
        .await;
    assert_eq!(usernames(&crew["restaurant"]["roleMembers"]), vec!["luigi", "mario"]);

    // admin also holds MANAGER but outranks the group.
    let managers = app
        .exec_ok(
            Some(app.seeded.manager),
            ROLE_MEMBERS,
            json!({ "role": "MANAGER" }),
        )
        .await;
    assert_eq!(usernames(&managers["restaurant"]["roleMembers"]), vec!["adrian"]);
}

#[tokio::test]
async fn manager_grants_crew_but_not_manager() {
    let app = TestApp::new().await;
    let data = app
        .exec_ok(
            Some(app.seeded.manager),
            GRANT,
            json!({ "user": id(app.seeded.other_customer), "role": "DELIVERY_CREW" }),
        )
        .await;
    let roles = data["restaurant"]["grantRole"]["roles"].as_array().unwrap().clone();
    assert!(roles.contains(&json!("DELIVERY_CREW")));
    assert!(roles.contains(&json!("CUSTOMER")));

    let denied = app
        .exec_as(
            Some(app.seeded.manager),
            GRANT,
            json!({ "user": id(app.seeded.other_customer), "role": "MANAGER" }),
        )
        .await;
    assert_eq!(error_code(&denied).as_deref(), Some("FORBIDDEN"));

    let by_admin = app
        .exec_ok(
            Some(app.seeded.admin),
            GRANT,
            json!({ "user": id(app.seeded.other_customer), "role": "MANAGER" }),
        )
        .await;
    let roles = by_admin["restaurant"]["grantRole"]["roles"].as_array().unwrap().clone();
    assert!(roles.contains(&json!("MANAGER")));
}

#[tokio::test]
async fn manager_cannot_change_an_administrator() {
    let app = TestApp::new().await;
    let response = app
        .exec_as(
            Some(app.seeded.manager),
            GRANT,
            json!({ "user": id(app.seeded.admin), "role": "DELIVERY_CREW" }),
        )
        .await;
    assert_eq!(error_code(&response).as_deref(), Some("INVALID_STATE"));

    let update = app
        .exec_as(
            Some(app.seeded.manager),
            r#"mutation($id: ID!) {
              restaurant { updateUser(id: $id, input: { isActive: false }) { isActive } }
            }"#,
            json!({ "id": id(app.seeded.admin) }),
        )
        .await;
    assert_eq!(error_code(&update).as_deref(), Some("FORBIDDEN"));
}

#[tokio::test]
async fn revoking_a_role_returns_the_remaining_roles() {
    let app = TestApp::new().await;
    let data = app
        .exec_ok(
            Some(app.seeded.manager),
            r#"mutation($user: ID!) {
              restaurant { revokeRole(userId: $user, role: DELIVERY_CREW) { roles } }
            }"#,
            json!({ "user": id(app.seeded.other_crew) }),
        )
        .await;
    assert_eq!(data["restaurant"]["revokeRole"]["roles"], json!([]));

    let crew = app
        .exec_ok(
            Some(app.seeded.manager),
            ROLE_MEMBERS,
            json!({ "role": "DELIVERY_CREW" }),
        )
        .await;
    assert_eq!(usernames(&crew["restaurant"]["roleMembers"]), vec!["mario"]);
}

#[tokio::test]
async fn customers_edit_only_their_own_profile() {
    let app = TestApp::new().await;
    let mutation = r#"
    mutation($id: ID!, $name: String) {
      restaurant { updateUser(id: $id, input: { displayName: $name }) { displayName } }
    }"#;

    let data = app
        .exec_ok(
            Some(app.seeded.customer),
            mutation,
            json!({ "id": id(app.seeded.customer), "name": "Tilly T." }),
        )
        .await;
    assert_eq!(data["restaurant"]["updateUser"]["displayName"], "Tilly T.");

    let denied = app
        .exec_as(
            Some(app.seeded.customer),
            mutation,
            json!({ "id": id(app.seeded.other_customer), "name": "Nope" }),
        )
        .await;
    assert_eq!(error_code(&denied).as_deref(), Some("FORBIDDEN"));
}

#[tokio::test]
async fn staff_create_users_with_roles() {
    let app = TestApp::new().await;
    let data = app
        .exec_ok(
            Some(app.seeded.manager),
            r#"mutation {
              restaurant {
                createUser(input: { username: "peach", email: "peach@littlelemon.test", roles: [DELIVERY_CREW] }) {
                  username roles
                }
              }
            }"#,
            json!({}),
        )
        .await;
    assert_eq!(data["restaurant"]["createUser"]["roles"], json!(["DELIVERY_CREW"]));

    let deleted = app
        .exec_ok(
            Some(app.seeded.manager),
            r#"mutation($id: ID!) { restaurant { deleteUser(id: $id) } }"#,
            json!({ "id": id(app.seeded.other_crew) }),
        )
        .await;
    assert_eq!(deleted["restaurant"]["deleteUser"], true);
    assert_eq!(app.count("user").await, 6);
}
