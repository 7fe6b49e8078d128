use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use server_api::{
    add_ingredient_to_recipe, create_ingredient, create_recipe, delete_ingredient, delete_recipe,
    ingredient_by_id, ingredient_by_name, list_ingredients, list_recipes, recipe_by_id,
    recipe_by_name, remove_ingredient_from_recipe, rename_ingredient,
    search_recipes_by_ingredients, update_recipe, ApiContext,
};
use shared::{
    domain::{IngredientId, RecipeId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateIngredientRequest, CreateRecipeRequest, IngredientDetail, MessageResponse,
        RecipeDetail, RenameIngredientRequest, UpdateRecipeRequest,
    },
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, normalize_database_url};

const MAX_BODY_BYTES: usize = 64 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter =
        EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ingredient/", post(http_create_ingredient))
        .route("/ingredient/id/:id", get(http_ingredient_by_id))
        .route("/ingredient/name/:name", get(http_ingredient_by_name))
        .route(
            "/ingredient/:id",
            put(http_rename_ingredient).delete(http_delete_ingredient),
        )
        .route("/ingredients/", get(http_list_ingredients))
        .route("/recipe/", post(http_create_recipe))
        .route("/recipe/id/:id", get(http_recipe_by_id))
        .route("/recipe/name/:name", get(http_recipe_by_name))
        .route("/recipe/ingredient/:names", get(http_search_recipes))
        .route(
            "/recipe/:id",
            put(http_update_recipe).delete(http_delete_recipe),
        )
        .route(
            "/recipe/:id/ingredient/:name",
            put(http_add_ingredient).delete(http_remove_ingredient),
        )
        .route("/recipes/", get(http_list_recipes))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_create_ingredient(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateIngredientRequest>,
) -> Result<(StatusCode, Json<IngredientDetail>), HttpError> {
    let ingredient = create_ingredient(&state.api, &req.name)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(ingredient)))
}

async fn http_ingredient_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<IngredientDetail>, HttpError> {
    let ingredient = ingredient_by_id(&state.api, IngredientId(id))
        .await
        .map_err(reject)?;
    Ok(Json(ingredient))
}

async fn http_ingredient_by_name(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<IngredientDetail>, HttpError> {
    let ingredient = ingredient_by_name(&state.api, &name)
        .await
        .map_err(reject)?;
    Ok(Json(ingredient))
}

async fn http_list_ingredients(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<IngredientDetail>>, HttpError> {
    let ingredients = list_ingredients(&state.api).await.map_err(reject)?;
    Ok(Json(ingredients))
}

async fn http_rename_ingredient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<RenameIngredientRequest>,
) -> Result<Json<MessageResponse>, HttpError> {
    let message = rename_ingredient(&state.api, IngredientId(id), &req.name)
        .await
        .map_err(reject)?;
    Ok(Json(message))
}

async fn http_delete_ingredient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, HttpError> {
    let message = delete_ingredient(&state.api, IngredientId(id))
        .await
        .map_err(reject)?;
    Ok(Json(message))
}

async fn http_create_recipe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRecipeRequest>,
) -> Result<(StatusCode, Json<RecipeDetail>), HttpError> {
    let recipe = create_recipe(&state.api, &req.name, &req.description)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn http_recipe_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, HttpError> {
    let recipe = recipe_by_id(&state.api, RecipeId(id))
        .await
        .map_err(reject)?;
    Ok(Json(recipe))
}

async fn http_recipe_by_name(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RecipeDetail>, HttpError> {
    let recipe = recipe_by_name(&state.api, &name).await.map_err(reject)?;
    Ok(Json(recipe))
}

async fn http_list_recipes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RecipeDetail>>, HttpError> {
    let recipes = list_recipes(&state.api).await.map_err(reject)?;
    Ok(Json(recipes))
}

async fn http_update_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRecipeRequest>,
) -> Result<Json<MessageResponse>, HttpError> {
    let message = update_recipe(&state.api, RecipeId(id), &req.name, &req.description)
        .await
        .map_err(reject)?;
    Ok(Json(message))
}

async fn http_delete_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, HttpError> {
    let message = delete_recipe(&state.api, RecipeId(id))
        .await
        .map_err(reject)?;
    Ok(Json(message))
}

async fn http_add_ingredient(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(i64, String)>,
) -> Result<Json<MessageResponse>, HttpError> {
    let message = add_ingredient_to_recipe(&state.api, RecipeId(id), &name)
        .await
        .map_err(reject)?;
    Ok(Json(message))
}

async fn http_remove_ingredient(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(i64, String)>,
) -> Result<Json<MessageResponse>, HttpError> {
    let message = remove_ingredient_from_recipe(&state.api, RecipeId(id), &name)
        .await
        .map_err(reject)?;
    Ok(Json(message))
}

async fn http_search_recipes(
    State(state): State<Arc<AppState>>,
    Path(names): Path<String>,
) -> Result<Json<Vec<RecipeDetail>>, HttpError> {
    let recipes = search_recipes_by_ingredients(&state.api, &names)
        .await
        .map_err(reject)?;
    Ok(Json(recipes))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
