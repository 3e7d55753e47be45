//! Navigation between console views.

use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    VmList,
    Networks,
}

pub trait Navigator {
    fn go_to(&self, route: Route);
}

/// Remembers every route it was sent to. The CLI reads it back to decide
/// what to print after an action.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes.lock().ok().and_then(|r| r.last().cloned())
    }
}

impl Navigator for RecordingNavigator {
    fn go_to(&self, route: Route) {
        tracing::debug!(?route, "navigate");
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(route);
        }
    }
}

impl<N: Navigator + ?Sized> Navigator for &N {
    fn go_to(&self, route: Route) {
        (**self).go_to(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_routes_in_order() {
        let nav = RecordingNavigator::new();
        nav.go_to(Route::Networks);
        nav.go_to(Route::VmList);
        assert_eq!(nav.routes().len(), 2);
        assert_eq!(nav.last(), Some(Route::VmList));
    }
}
