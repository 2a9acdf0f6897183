//! Access control for image requests.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                   ImageService                        │
//! └──────────────┬────────────────────────┬───────────────┘
//!                │                        │
//!                ▼                        ▼
//! ┌─────────────────────────┐  ┌──────────────────────────┐
//! │       classify()        │  │       AccessGate         │
//! │ (Thumbnail / Fullsize)  │  │ (verdict → placeholder)  │
//! └─────────────────────────┘  └────────────┬─────────────┘
//!                                           │
//!                                           ▼
//!                              ┌──────────────────────────┐
//!                              │   RightsService trait    │
//!                              │ LicenseClient/OpenAccess │
//!                              └──────────────────────────┘
//! ```

mod classify;
mod gate;
mod license;

pub use classify::{classify, iiif_size, PresentationClass};
pub use gate::{AccessGate, AccessVerdict, GateOutcome, PlaceholderImage, Placeholders};
pub use license::{
    AccessCheckRequest, AccessCheckResponse, LicenseClient, OpenAccess, RightsService,
    UserAttribute,
};
