//! C5: the launcher-population reconciler. Keeps a desired number of idle
//! launcher pods warm per `(node, LauncherConfig)` tuple, ahead of any SRP
//! ever asking for one (§4.5).

pub mod controller;
pub mod policy;
pub mod reconcile;

pub use controller::PopulationController;
