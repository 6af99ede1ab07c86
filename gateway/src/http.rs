use crate::auth::{caller_from_headers, AuthFailure};
use crate::metrics::gather_metrics;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use fleetcore::platform::{
    CallContext, DecommissionTicket, NewVehicle, PlatformError, ProvisioningTicket,
    RegistryView, VehicleCategory,
};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
}

#[derive(Serialize, ToSchema)]
pub struct VersionResponse {
    pub service: String,
    pub version: String,
    pub git_sha: String,
    pub git_tag: String,
    pub build_ts: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Platform(PlatformError),
    Auth(AuthFailure),
}

impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        ApiError::Platform(err)
    }
}

impl From<AuthFailure> for ApiError {
    fn from(err: AuthFailure) -> Self {
        ApiError::Auth(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Platform(err) => match err {
                PlatformError::AlreadyInitialized => (StatusCode::CONFLICT, "already_initialized"),
                PlatformError::DuplicateResource(_) => (StatusCode::CONFLICT, "duplicate_resource"),
                PlatformError::NotInitialized => {
                    (StatusCode::PRECONDITION_FAILED, "not_initialized")
                }
                PlatformError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
                PlatformError::InsufficientFunds { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "insufficient_funds")
                }
                PlatformError::Unauthorized => (StatusCode::FORBIDDEN, "unauthorized"),
                PlatformError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            ApiError::Auth(AuthFailure::BadDeposit) => (StatusCode::BAD_REQUEST, "bad_deposit"),
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Platform(err) => err.to_string(),
            ApiError::Auth(err) => err.message().to_string(),
        };
        if status.is_server_error() {
            tracing::error!(%status, %message, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

/// Authenticated caller of a mutating route.
pub struct Caller(pub CallContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(caller_from_headers(&parts.headers)?))
    }
}

#[derive(Deserialize, ToSchema)]
pub struct InitializeRequest {
    pub name: String,
    pub owners: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AccountRequest {
    pub account_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AddVehicleRequest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub data: String,
    /// One of car, motorcycle, truck, bus, van, other.
    pub category: String,
    pub owner: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegistryResponse {
    pub name: String,
    pub created_at: String,
    pub account_id: String,
    pub owners: Vec<String>,
    pub contributors: Vec<String>,
    pub vehicle_count: u64,
}

impl From<RegistryView> for RegistryResponse {
    fn from(view: RegistryView) -> Self {
        Self {
            name: view.name,
            created_at: view.created_at.to_rfc3339(),
            account_id: view.account_id.to_string(),
            owners: view.owners.into_iter().map(String::from).collect(),
            contributors: view.contributors.into_iter().map(String::from).collect(),
            vehicle_count: view.vehicle_count,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MembershipChange {
    pub account_id: String,
    /// False when the call was a no-op.
    pub changed: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VehicleResponse {
    pub id: String,
    pub address: String,
    pub registered: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VehicleCountResponse {
    pub count: u64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub account_id: String,
    /// Display form, e.g. `owner+contributor` or `none`.
    pub roles: String,
    pub owner: bool,
    pub contributor: bool,
}

/// Receipt for a dispatched chain. The registry changes only once the
/// callback arrives.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TicketResponse {
    pub vehicle: String,
    pub address: String,
    pub ticket: String,
    pub state: String,
}

impl From<ProvisioningTicket> for TicketResponse {
    fn from(t: ProvisioningTicket) -> Self {
        Self {
            vehicle: t.vehicle.to_string(),
            address: t.address.to_string(),
            ticket: t.ticket.to_string(),
            state: state_name(&t.state),
        }
    }
}

impl From<DecommissionTicket> for TicketResponse {
    fn from(t: DecommissionTicket) -> Self {
        Self {
            vehicle: t.vehicle.to_string(),
            address: t.address.to_string(),
            ticket: t.ticket.to_string(),
            state: state_name(&t.state),
        }
    }
}

fn state_name<T: Serialize>(state: &T) -> String {
    serde_json::to_value(state)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    #[schema(value_type = Object)]
    pub counters: serde_json::Value,
    #[schema(value_type = Vec<Object>)]
    pub recent_events: Vec<serde_json::Value>,
}

type ApiResult<T> = Result<T, ApiError>;

#[utoipa::path(get, path = "/health", tag = "system", responses( (status = 200, description = "Service healthy", body = HealthResponse) ))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: fleetcore::config().service_name.clone(),
    })
}

#[utoipa::path(get, path = "/version", tag = "system", responses( (status = 200, description = "Version info", body = VersionResponse) ))]
pub async fn version() -> Json<VersionResponse> {
    Json(version_payload())
}

pub fn version_payload() -> VersionResponse {
    let info = fleetcore::build_info();
    VersionResponse {
        service: fleetcore::config().service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: info.git_sha.to_string(),
        git_tag: info.git_tag.to_string(),
        build_ts: info.build_timestamp.to_string(),
    }
}

#[utoipa::path(get, path = "/metrics", tag = "system", responses( (status = 200, description = "Prometheus text exposition") ))]
pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    gather_metrics(&state.platform.diagnostics().metrics().snapshot())
}

#[utoipa::path(get, path = "/diagnostics", tag = "system", responses( (status = 200, body = DiagnosticsResponse) ))]
pub async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let diagnostics = state.platform.diagnostics();
    let counters = diagnostics
        .metrics()
        .snapshot()
        .into_iter()
        .map(|sample| (sample.name, serde_json::Value::from(sample.value)))
        .collect::<serde_json::Map<_, _>>();
    let recent_events = diagnostics
        .recent_events()
        .iter()
        .filter_map(|event| serde_json::to_value(event).ok())
        .collect();
    Json(DiagnosticsResponse {
        counters: serde_json::Value::Object(counters),
        recent_events,
    })
}

#[utoipa::path(get, path = "/api-docs/openapi.json", tag = "system", responses( (status = 200, description = "OpenAPI document") ))]
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(api_doc())
}

#[utoipa::path(post, path = "/registry/initialize", tag = "registry", request_body = InitializeRequest,
    responses( (status = 200, body = RegistryResponse), (status = 409, body = ErrorBody), (status = 402, body = ErrorBody) ),
    security(("BearerAuth" = [])))]
pub async fn initialize(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<InitializeRequest>,
) -> ApiResult<Json<RegistryResponse>> {
    let view = state.registry().initialize(&ctx, &req.name, &req.owners)?;
    Ok(Json(view.into()))
}

#[utoipa::path(get, path = "/registry", tag = "registry", responses( (status = 200, body = RegistryResponse), (status = 412, body = ErrorBody) ))]
pub async fn get_registry(State(state): State<AppState>) -> ApiResult<Json<RegistryResponse>> {
    Ok(Json(state.registry().get_registry()?.into()))
}

#[utoipa::path(get, path = "/registry/owners", tag = "registry", responses( (status = 200, body = [String]) ))]
pub async fn list_owners(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let owners = state.registry().get_owners()?;
    Ok(Json(owners.into_iter().map(String::from).collect()))
}

#[utoipa::path(post, path = "/registry/owners", tag = "registry", request_body = AccountRequest,
    responses( (status = 200, body = MembershipChange), (status = 403, body = ErrorBody) ), security(("BearerAuth" = [])))]
pub async fn add_owner(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<AccountRequest>,
) -> ApiResult<Json<MembershipChange>> {
    let changed = state.registry().add_owner(&ctx, &req.account_id)?;
    Ok(Json(MembershipChange {
        account_id: req.account_id,
        changed,
    }))
}

#[utoipa::path(delete, path = "/registry/owners/{account}", tag = "registry",
    params(("account" = String, Path, description = "Owner account id")),
    responses( (status = 200, body = MembershipChange), (status = 403, body = ErrorBody) ), security(("BearerAuth" = [])))]
pub async fn remove_owner(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(account): Path<String>,
) -> ApiResult<Json<MembershipChange>> {
    let changed = state.registry().remove_owner(&ctx, &account)?;
    Ok(Json(MembershipChange {
        account_id: account,
        changed,
    }))
}

#[utoipa::path(get, path = "/registry/contributors", tag = "registry", responses( (status = 200, body = [String]) ))]
pub async fn list_contributors(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let contributors = state.registry().get_contributors()?;
    Ok(Json(contributors.into_iter().map(String::from).collect()))
}

#[utoipa::path(post, path = "/registry/contributors", tag = "registry", request_body = AccountRequest,
    responses( (status = 200, body = MembershipChange), (status = 403, body = ErrorBody) ), security(("BearerAuth" = [])))]
pub async fn add_contributor(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<AccountRequest>,
) -> ApiResult<Json<MembershipChange>> {
    let changed = state.registry().add_contributor(&ctx, &req.account_id)?;
    Ok(Json(MembershipChange {
        account_id: req.account_id,
        changed,
    }))
}

#[utoipa::path(delete, path = "/registry/contributors/{account}", tag = "registry",
    params(("account" = String, Path, description = "Contributor account id")),
    responses( (status = 200, body = MembershipChange), (status = 403, body = ErrorBody) ), security(("BearerAuth" = [])))]
pub async fn remove_contributor(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(account): Path<String>,
) -> ApiResult<Json<MembershipChange>> {
    let changed = state.registry().remove_contributor(&ctx, &account)?;
    Ok(Json(MembershipChange {
        account_id: account,
        changed,
    }))
}

#[utoipa::path(post, path = "/registry/membership/self", tag = "registry",
    responses( (status = 200, body = MembershipChange) ), security(("BearerAuth" = [])))]
pub async fn join_as_contributor(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> ApiResult<Json<MembershipChange>> {
    let changed = state.registry().add_self_as_contributor(&ctx)?;
    Ok(Json(MembershipChange {
        account_id: ctx.predecessor.to_string(),
        changed,
    }))
}

#[utoipa::path(delete, path = "/registry/membership/self", tag = "registry",
    responses( (status = 200, body = MembershipChange) ), security(("BearerAuth" = [])))]
pub async fn leave_as_contributor(
    State(state): State<AppState>,
    Caller(ctx): Caller,
) -> ApiResult<Json<MembershipChange>> {
    let changed = state.registry().remove_self_as_contributor(&ctx)?;
    Ok(Json(MembershipChange {
        account_id: ctx.predecessor.to_string(),
        changed,
    }))
}

#[utoipa::path(get, path = "/registry/roles/{account}", tag = "registry",
    params(("account" = String, Path, description = "Account id")),
    responses( (status = 200, body = RoleResponse) ))]
pub async fn role_of(
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> ApiResult<Json<RoleResponse>> {
    use fleetcommon::auth::Role;
    let roles = state.registry().role_of(&account)?;
    Ok(Json(RoleResponse {
        account_id: account,
        roles: roles.to_string(),
        owner: roles.contains(Role::Owner),
        contributor: roles.contains(Role::Contributor),
    }))
}

#[utoipa::path(get, path = "/registry/vehicles", tag = "vehicles", responses( (status = 200, body = [String]) ))]
pub async fn list_vehicles(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let vehicles = state.registry().get_vehicles()?;
    Ok(Json(vehicles.into_iter().map(String::from).collect()))
}

#[utoipa::path(get, path = "/registry/vehicles/count", tag = "vehicles", responses( (status = 200, body = VehicleCountResponse) ))]
pub async fn vehicle_count(State(state): State<AppState>) -> ApiResult<Json<VehicleCountResponse>> {
    Ok(Json(VehicleCountResponse {
        count: state.registry().get_vehicle_count()?,
    }))
}

#[utoipa::path(get, path = "/registry/vehicles/{id}", tag = "vehicles",
    params(("id" = String, Path, description = "Vehicle short id")),
    responses( (status = 200, body = VehicleResponse), (status = 400, body = ErrorBody) ))]
pub async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VehicleResponse>> {
    let registry = state.registry();
    let registered = registry.has_vehicle(&id)?;
    let address = registry.vehicle_address(&id)?;
    Ok(Json(VehicleResponse {
        id,
        address: address.to_string(),
        registered,
    }))
}

#[utoipa::path(post, path = "/registry/vehicles", tag = "vehicles", request_body = AddVehicleRequest,
    responses( (status = 202, body = TicketResponse), (status = 402, body = ErrorBody), (status = 409, body = ErrorBody) ),
    security(("BearerAuth" = [])))]
pub async fn add_vehicle(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<AddVehicleRequest>,
) -> ApiResult<(StatusCode, Json<TicketResponse>)> {
    let category: VehicleCategory = req.category.parse()?;
    let ticket = state.registry().add_vehicle(
        &ctx,
        NewVehicle::new(req.id, req.title, req.data, category, req.owner),
    )?;
    Ok((StatusCode::ACCEPTED, Json(ticket.into())))
}

#[utoipa::path(delete, path = "/registry/vehicles/{id}", tag = "vehicles",
    params(("id" = String, Path, description = "Vehicle short id")),
    responses( (status = 202, body = TicketResponse), (status = 403, body = ErrorBody) ),
    security(("BearerAuth" = [])))]
pub async fn remove_vehicle(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<TicketResponse>)> {
    let ticket = state.registry().remove_vehicle(&ctx, &id)?;
    Ok((StatusCode::ACCEPTED, Json(ticket.into())))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health, version, metrics, diagnostics, openapi_json,
        initialize, get_registry, list_owners, add_owner, remove_owner,
        list_contributors, add_contributor, remove_contributor,
        join_as_contributor, leave_as_contributor, role_of,
        list_vehicles, vehicle_count, get_vehicle, add_vehicle, remove_vehicle
    ),
    components(schemas(
        HealthResponse, VersionResponse, ErrorBody, DiagnosticsResponse,
        InitializeRequest, AccountRequest, AddVehicleRequest, RegistryResponse,
        MembershipChange, VehicleResponse, VehicleCountResponse, RoleResponse, TicketResponse
    )),
    tags(
        (name = "system", description = "System & meta endpoints"),
        (name = "registry", description = "Registry record and membership"),
        (name = "vehicles", description = "Vehicle provisioning and decommission")
    )
)]
pub struct ApiDoc;

/// The generated document plus the bearer security scheme.
pub fn api_doc() -> utoipa::openapi::OpenApi {
    use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
    let mut openapi = ApiDoc::openapi();
    let mut comps = openapi.components.unwrap_or_default();
    comps.add_security_scheme(
        "BearerAuth",
        SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
    );
    openapi.components = Some(comps);
    openapi
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/metrics", get(metrics))
        .route("/diagnostics", get(diagnostics))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/registry", get(get_registry))
        .route("/registry/initialize", post(initialize))
        .route("/registry/owners", get(list_owners).post(add_owner))
        .route("/registry/owners/:account", delete(remove_owner))
        .route(
            "/registry/contributors",
            get(list_contributors).post(add_contributor),
        )
        .route("/registry/contributors/:account", delete(remove_contributor))
        .route(
            "/registry/membership/self",
            post(join_as_contributor).delete(leave_as_contributor),
        )
        .route("/registry/roles/:account", get(role_of))
        .route("/registry/vehicles", get(list_vehicles).post(add_vehicle))
        .route("/registry/vehicles/count", get(vehicle_count))
        .route(
            "/registry/vehicles/:id",
            get(get_vehicle).delete(remove_vehicle),
        )
}
