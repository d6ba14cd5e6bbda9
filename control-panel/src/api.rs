use crate::{
    error::PanelError,
    panel::{PanelHandle, Status},
    session::{ConnectionState, Controls, PanelCommand, ToggleAction},
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use device::{ServoAngle, ServoId};
use serde::Deserialize;
use serde_json::json;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// # API Documentation
///
/// `ApiDoc` generates the OpenAPI specification for the control panel,
/// which drives the robot session, its commands and its servos.
#[derive(OpenApi)]
#[openapi(
    paths(root, status, telemetry, connect, disconnect, toggle, command, servo),
    components(
        schemas(Status, Controls, ConnectionState, ToggleAction, PanelCommand, CommandRequest, ServoRequest)
    ),
    tags(
        (name = "Control Panel", description = "Session, commands and telemetry of the robot")
    )
)]
pub struct ApiDoc;

/// Body of `POST /command`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CommandRequest {
    #[schema(example = "start")]
    pub command: PanelCommand,
}

/// Body of `POST /servo/{id}`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ServoRequest {
    /// Target angle in degrees, `0..=180`.
    #[schema(example = 90, minimum = 0, maximum = 180)]
    pub position: u16,
}

/// A [`PanelError`] on its way out as an HTTP response.
pub struct ApiError(PanelError);

impl From<PanelError> for ApiError {
    fn from(err: PanelError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PanelError::InvalidCommandState { .. } => StatusCode::CONFLICT,
            PanelError::InvalidServo(_) => StatusCode::BAD_REQUEST,
            PanelError::ConnectionTimeout(_)
            | PanelError::DeviceUnreachable(_)
            | PanelError::Device { .. } => StatusCode::BAD_GATEWAY,
            PanelError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        };

        (
            status,
            Json(json!({"status": "error", "message": self.0.to_string()})),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<Status>, ApiError>;

/// Build the control API around a running panel.
pub fn router(panel: PanelHandle) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(root))
        .route("/status", get(status))
        .route("/telemetry", get(telemetry))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/toggle", post(toggle))
        .route("/command", post(command))
        .route("/servo/{id}", post(servo))
        .with_state(panel)
}

#[utoipa::path(get, path = "/", tag = "Control Panel", responses((status = 200, description = "API is up")))]
pub async fn root() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "Robot control panel is running" }))
}

#[utoipa::path(
    get,
    path = "/status",
    tag = "Control Panel",
    responses((status = 200, description = "Current panel state", body = Status))
)]
pub async fn status(State(panel): State<PanelHandle>) -> ApiResult {
    Ok(Json(panel.status().await?))
}

#[utoipa::path(
    get,
    path = "/telemetry",
    tag = "Control Panel",
    responses(
        (status = 200, description = "Latest telemetry sample"),
        (status = 404, description = "No sample taken yet")
    )
)]
pub async fn telemetry(State(panel): State<PanelHandle>) -> Result<Response, ApiError> {
    let status = panel.status().await?;

    Ok(match status.telemetry {
        Some(sample) => Json(sample).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "No telemetry received yet"})),
        )
            .into_response(),
    })
}

#[utoipa::path(
    post,
    path = "/connect",
    tag = "Control Panel",
    responses((status = 200, description = "Connecting (or already connected)", body = Status))
)]
pub async fn connect(State(panel): State<PanelHandle>) -> ApiResult {
    Ok(Json(panel.connect().await?))
}

#[utoipa::path(
    post,
    path = "/disconnect",
    tag = "Control Panel",
    responses((status = 200, description = "Disconnected", body = Status))
)]
pub async fn disconnect(State(panel): State<PanelHandle>) -> ApiResult {
    Ok(Json(panel.disconnect().await?))
}

#[utoipa::path(
    post,
    path = "/toggle",
    tag = "Control Panel",
    responses((status = 200, description = "Connecting or disconnected", body = Status))
)]
pub async fn toggle(State(panel): State<PanelHandle>) -> ApiResult {
    Ok(Json(panel.toggle().await?))
}

#[utoipa::path(
    post,
    path = "/command",
    tag = "Control Panel",
    request_body = CommandRequest,
    responses(
        (status = 200, description = "Command accepted", body = Status),
        (status = 409, description = "Not connected"),
        (status = 502, description = "Device rejected the command")
    )
)]
pub async fn command(
    State(panel): State<PanelHandle>,
    Json(request): Json<CommandRequest>,
) -> ApiResult {
    log::debug!("Command request: {:?}", request);
    Ok(Json(panel.command(request.command).await?))
}

#[utoipa::path(
    post,
    path = "/servo/{id}",
    tag = "Control Panel",
    params(("id" = String, Path, description = "Servo, `servo1` to `servo4` (or `1` to `4`)")),
    request_body = ServoRequest,
    responses(
        (status = 200, description = "Servo moved", body = Status),
        (status = 400, description = "Unknown servo, angle out of range or malformed body"),
        (status = 409, description = "Not connected")
    )
)]
pub async fn servo(
    State(panel): State<PanelHandle>,
    Path(id): Path<String>,
    request: Result<Json<ServoRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) =
        request.map_err(|rejection| PanelError::InvalidServo(rejection.body_text()))?;
    let servo = id
        .parse::<ServoId>()
        .map_err(|err| PanelError::InvalidServo(err.to_string()))?;
    let angle = ServoAngle::new(request.position)
        .map_err(|err| PanelError::InvalidServo(err.to_string()))?;

    Ok(Json(panel.set_servo(servo, angle).await?))
}
