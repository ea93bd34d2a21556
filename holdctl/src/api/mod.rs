//! HTTP API: axum handlers and their request/response models.
//!
//! - **Events** (`/events/*`): create events and read their capacity summary
//! - **Reservations** (`/reservations/*`): place holds, confirm them, read your own reservations
//!
//! Reading an event (`GET /events/{id}`) and `/healthz` are public. Every other endpoint requires
//! `Authorization: Bearer <token>`. The OpenAPI document is served at `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
pub mod openapi;
