//! Liveness probe.

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    summary = "Liveness probe",
    responses((status = 200, description = "Service is up"))
)]
pub async fn healthz() -> &'static str {
    "OK"
}
