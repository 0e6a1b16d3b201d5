use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scene::{self, Frame, FrameOptions};
use crate::views::{View, ViewGraph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewState {
    pub view: View,
    /// Flow-weighted (Sankey) presentation.
    pub flow: bool,
}

impl ViewState {
    pub const fn new(view: View, flow: bool) -> Self {
        Self { view, flow }
    }

    /// All six states.
    pub fn all() -> impl Iterator<Item = ViewState> {
        View::ALL
            .into_iter()
            .flat_map(|view| [false, true].map(|flow| ViewState::new(view, flow)))
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flow {
            write!(f, "{} (flow)", self.view.as_str())
        } else {
            f.write_str(self.view.as_str())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Collapsed,
    Expanded,
}

pub type FrameBuilder = fn(&ViewGraph, &FrameOptions) -> Frame;

#[derive(Clone, Copy)]
pub struct ViewPlan {
    pub state: ViewState,
    pub layout: LayoutMode,
    pub build_frame: FrameBuilder,
    pub name: &'static str,
}

impl fmt::Debug for ViewPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewPlan")
            .field("state", &self.state)
            .field("layout", &self.layout)
            .field("name", &self.name)
            .finish()
    }
}

pub fn select(state: ViewState) -> ViewPlan {
    let (build_frame, name): (FrameBuilder, &'static str) = match (state.view, state.flow) {
        (View::Site, false) => (scene::to_site, "to_site"),
        (View::Site, true) => (scene::to_site_sankey, "to_site_sankey"),
        (View::Deployment, false) => (scene::to_deployment, "to_deployment"),
        (View::Deployment, true) => (scene::to_deployment_sankey, "to_deployment_sankey"),
        (View::Service, false) => (scene::to_service, "to_service"),
        (View::Service, true) => (scene::to_service_sankey, "to_service_sankey"),
    };
    ViewPlan {
        state,
        layout: if state.flow {
            LayoutMode::Expanded
        } else {
            LayoutMode::Collapsed
        },
        build_frame,
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_state_has_a_distinct_plan() {
        let names: HashSet<&str> = ViewState::all().map(|state| select(state).name).collect();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn flow_means_expanded() {
        for state in ViewState::all() {
            let plan = select(state);
            assert_eq!(plan.layout == LayoutMode::Expanded, state.flow);
            assert_eq!(plan.state, state);
        }
        assert_eq!(ViewState::new(View::Site, true).to_string(), "site (flow)");
    }
}
