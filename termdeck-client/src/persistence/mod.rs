//! Local persistence of the registry and layout

mod debounce;
mod reconcile;
mod store;

pub use debounce::{PersistDebounce, PERSIST_DEBOUNCE};
pub use reconcile::reconcile_sessions;
pub use store::{
    StateStore, ACTIVE_SESSION_FILE, GROUPS_FILE, LAYOUT_FILE, SESSIONS_FILE,
};
