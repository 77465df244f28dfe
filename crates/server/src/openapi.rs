use std::collections::HashMap;

use utoipa::OpenApi;
use utoipa::ToSchema;

#[derive(ToSchema)]
pub struct HealthResponse { pub status: String }

/// Error envelope.
#[derive(ToSchema)]
pub struct ErrorDoc { pub err: String }

/// Full key → value mapping of one namespace.
#[derive(ToSchema)]
pub struct CollectionDoc(pub HashMap<String, String>);

#[derive(ToSchema)]
pub struct KeyValueDoc { pub key: String, pub value: Option<String> }

/// Any JSON value; non-strings are stored as their JSON text.
#[derive(ToSchema)]
pub struct SetValueDoc { pub value: String }

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::storage::get_all,
        crate::routes::storage::set_all,
        crate::routes::storage::delete_all,
        crate::routes::storage::get_key,
        crate::routes::storage::set_key,
        crate::routes::storage::delete_key,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorDoc,
            CollectionDoc,
            KeyValueDoc,
            SetValueDoc,
        )
    ),
    tags(
        (name = "health"),
        (name = "storage")
    )
)]
pub struct ApiDoc;
