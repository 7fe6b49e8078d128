use super::*;
use axum::{
    body::{self, Body},
    http::Request,
    response::Response,
};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

async fn test_app() -> Router {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    build_router(Arc::new(AppState {
        api: ApiContext { storage },
    }))
}

fn json_request(method: &str, uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn seed_soup(app: &Router) -> RecipeDetail {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/ingredient/",
            serde_json::json!({ "name": "Salt" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/recipe/",
            serde_json::json!({ "name": "Soup", "description": "Hot broth" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = test_app().await;
    let response = app
        .oneshot(empty_request("GET", "/healthz"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn attach_then_fetch_recipe_by_id_and_name() {
    let app = test_app().await;
    let soup = seed_soup(&app).await;

    let response = app
        .clone()
        .oneshot(empty_request(
            "PUT",
            &format!("/recipe/{}/ingredient/Salt", soup.id.0),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let message: MessageResponse = read_json(response).await;
    assert_eq!(
        message.message,
        "Ingredient Salt successfully added to recipe Soup."
    );

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/recipe/id/{}", soup.id.0)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let recipe: RecipeDetail = read_json(response).await;
    assert_eq!(recipe.ingredient_names(), vec!["Salt"]);

    let response = app
        .oneshot(empty_request("GET", "/recipe/name/Soup"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let by_name: RecipeDetail = read_json(response).await;
    assert_eq!(by_name, recipe);
}

#[tokio::test]
async fn duplicate_ingredient_returns_conflict() {
    let app = test_app().await;
    seed_soup(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/ingredient/",
            serde_json::json!({ "name": "Salt" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::Conflict);
    assert_eq!(err.message, "Ingredient Salt already exists.");

    let response = app
        .oneshot(empty_request("GET", "/ingredients/"))
        .await
        .expect("response");
    let ingredients: Vec<IngredientDetail> = read_json(response).await;
    assert_eq!(ingredients.len(), 1);
}

#[tokio::test]
async fn missing_rows_map_to_not_found() {
    let app = test_app().await;

    for (method, uri) in [
        ("GET", "/ingredient/id/5"),
        ("GET", "/ingredient/name/Pepper"),
        ("DELETE", "/ingredient/5"),
        ("GET", "/recipe/id/5"),
        ("DELETE", "/recipe/5"),
        ("PUT", "/recipe/5/ingredient/Salt"),
    ] {
        let response = app
            .clone()
            .oneshot(empty_request(method, uri))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
    }

    let response = app
        .oneshot(json_request(
            "PUT",
            "/ingredient/5",
            serde_json::json!({ "name": "Salt" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_numeric_id_is_a_bad_request() {
    let app = test_app().await;
    let response = app
        .oneshot(empty_request("GET", "/recipe/id/soup"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_recipe_then_read_back() {
    let app = test_app().await;
    let soup = seed_soup(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/recipe/{}", soup.id.0),
            serde_json::json!({ "name": "Stew", "description": "Slow cooked" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(empty_request("GET", &format!("/recipe/id/{}", soup.id.0)))
        .await
        .expect("response");
    let recipe: RecipeDetail = read_json(response).await;
    assert_eq!(recipe.name, "Stew");
    assert_eq!(recipe.description, "Slow cooked");
}

#[tokio::test]
async fn search_route_returns_union_and_detach_is_idempotent() {
    let app = test_app().await;
    let soup = seed_soup(&app).await;
    app.clone()
        .oneshot(json_request(
            "POST",
            "/ingredient/",
            serde_json::json!({ "name": "sugar" }),
        ))
        .await
        .expect("response");
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/recipe/",
            serde_json::json!({ "name": "Syrup" }),
        ))
        .await
        .expect("response");
    let syrup: RecipeDetail = read_json(response).await;

    for uri in [
        format!("/recipe/{}/ingredient/Salt", soup.id.0),
        format!("/recipe/{}/ingredient/sugar", syrup.id.0),
    ] {
        let response = app
            .clone()
            .oneshot(empty_request("PUT", &uri))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/recipe/ingredient/Salt,sugar"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let found: Vec<RecipeDetail> = read_json(response).await;
    let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Soup", "Syrup"]);

    let uri = format!("/recipe/{}/ingredient/sugar", soup.id.0);
    let response = app
        .oneshot(empty_request("DELETE", &uri))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let message: MessageResponse = read_json(response).await;
    assert_eq!(message.message, "Ingredient not in recipe");
}

#[tokio::test]
async fn deleting_ingredient_removes_it_from_recipe() {
    let app = test_app().await;
    let soup = seed_soup(&app).await;
    app.clone()
        .oneshot(empty_request(
            "PUT",
            &format!("/recipe/{}/ingredient/Salt", soup.id.0),
        ))
        .await
        .expect("response");

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/ingredient/name/Salt"))
        .await
        .expect("response");
    let salt: IngredientDetail = read_json(response).await;
    assert_eq!(salt.recipes.len(), 1);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/ingredient/{}", salt.id.0)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/ingredient/id/{}", salt.id.0)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(empty_request("GET", "/recipes/"))
        .await
        .expect("response");
    let recipes: Vec<RecipeDetail> = read_json(response).await;
    assert_eq!(recipes.len(), 1);
    assert!(recipes[0].ingredients.is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = test_app().await;
    let payload = serde_json::json!({ "name": "x".repeat(MAX_BODY_BYTES + 1) }).to_string();
    let request = Request::post("/ingredient/")
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
