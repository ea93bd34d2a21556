//! OpenAPI document for the reservation API.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::{handlers, models};
use crate::db::models::reservations::ReservationState;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("HS256 token whose `sub` claim is the caller's user ID."))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "holdctl", description = "Time-limited holds on finite event capacity"),
    paths(
        handlers::events::create_event,
        handlers::events::get_event,
        handlers::reservations::place_hold,
        handlers::reservations::confirm_hold,
        handlers::reservations::get_reservation,
    ),
    components(schemas(
        models::events::EventCreate,
        models::events::EventResponse,
        models::events::EventSummaryResponse,
        models::reservations::HoldCreate,
        models::reservations::ReservationResponse,
        ReservationState,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "events", description = "Events and their capacity"),
        (name = "reservations", description = "Holds and confirmations"),
    )
)]
pub struct ApiDoc;
