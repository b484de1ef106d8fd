/// Router Module Index
///
/// Splits the routing table by who may reach each route. Access control is
/// attached per module in `create_router` (via Axum route layers), so a route
/// cannot end up in the wrong class by accident.

/// Routes open to every visitor, anonymous included.
pub mod public;

/// Routes behind `require_authentication`: any live account.
pub mod authenticated;

/// Routes behind `require_author`: approved teachers and admins.
pub mod author;

/// Routes of the approval workflow, which gates every call itself.
pub mod admin;
