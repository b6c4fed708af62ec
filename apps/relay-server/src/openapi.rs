use relay_protocol::{
    ChatStatus, PollHint, ProblemDetails, RunDiagnostic, RunFailure, StatusReply, SubmitAccepted,
    SubmitRequest,
};
use utoipa::{OpenApi, ToSchema};

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct HealthOk {
    pub ok: bool,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct HttpInfo {
    pub bind: String,
    pub port: u16,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct AboutResponse {
    pub service: String,
    pub version: String,
    pub http: HttpInfo,
    pub polling: PollHint,
    pub thread_configured: bool,
    #[schema(example = json!(["GET /healthz", "POST /chat"]))]
    pub endpoints: Vec<String>,
    #[schema(value_type = Vec<serde_json::Value>)]
    pub endpoints_meta: Vec<serde_json::Value>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::meta::root,
        crate::api::meta::healthz,
        crate::api::meta::about,
        crate::api::metrics::metrics_prometheus,
        crate::api::chat::chat_submit,
        crate::api::chat::chat_status,
        crate::api::chat::chat_status_thread,
        crate::api::diagnostics::run_diagnostic,
        crate::api::spec::spec_openapi,
    ),
    components(
        schemas(
            HealthOk,
            HttpInfo,
            AboutResponse,
            ChatStatus,
            PollHint,
            ProblemDetails,
            RunDiagnostic,
            RunFailure,
            StatusReply,
            SubmitAccepted,
            SubmitRequest,
        )
    ),
    tags(
        (name = "Meta", description = "Service metadata and health"),
        (name = "Chat", description = "Submit prompts and poll run status"),
        (name = "Diagnostics", description = "Raw gateway run inspection"),
        (name = "Specs", description = "Generated API documents")
    )
)]
pub struct ApiDoc;
