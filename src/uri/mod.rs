//! The URI/Locator address model: `ResourceUri`, `ExternalUri`, `WebUrl`,
//! and the affordance suffix grammar.

mod affordance;
mod external;
mod resource;
mod web;

pub use affordance::{Affordance, AffordanceUri};
pub use external::ExternalUri;
pub use resource::{Realm, ResourceUri, Subrealm};
pub use web::WebUrl;
