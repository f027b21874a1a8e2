//! Embedded-document renderers.
//!
//! Embeds are loaded from `{host}/show?template={template}&{query}`, with
//! `&mode=design` appended when the author is designing one. Plain embedded
//! kinds take their query from the synchronizer; designable kinds store the
//! query the embed itself produced in design mode.

use std::fmt;

use smol_str::SmolStr;

use crate::properties::WidgetBody;
use crate::query::CanonicalQuery;
use crate::registry::{Control, Formatting, RenderContext, Renderer, View};
use crate::slots::{FILLED_SLOTS, merge_filled_slots};
use crate::sync::QueryState;

/// URL of one embedded document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbedSrc {
    host: String,
    template: SmolStr,
    query: Option<CanonicalQuery>,
    design: bool,
}

impl EmbedSrc {
    pub fn new(host: &str, template: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_owned(),
            template: template.into(),
            query: None,
            design: false,
        }
    }

    /// Attach a query. An empty query is the same as none.
    pub fn with_query(mut self, query: Option<CanonicalQuery>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }

    /// The same document opened in design mode.
    pub fn in_design_mode(mut self) -> Self {
        self.design = true;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn query(&self) -> Option<&CanonicalQuery> {
        self.query.as_ref()
    }

    pub fn is_design(&self) -> bool {
        self.design
    }
}

impl fmt::Display for EmbedSrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/show?template={}", self.host, self.template)?;
        if let Some(query) = &self.query {
            write!(f, "&{query}")?;
        }
        if self.design {
            f.write_str("&mode=design")?;
        }
        Ok(())
    }
}

fn authoring_controls(cx: &RenderContext<'_>) -> Vec<Control> {
    let mut controls = Vec::new();
    if let Some(extras) = &cx.extras {
        if extras.design {
            controls.push(Control::OpenDesign);
        }
        if extras.select_as_active {
            controls.push(Control::SelectAsActive);
        }
    }
    controls
}

/// Embed whose query is derived from its property tree.
#[derive(Clone, Debug)]
pub struct EmbedRenderer {
    template: SmolStr,
}

impl EmbedRenderer {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Renderer for EmbedRenderer {
    fn render(&self, body: &WidgetBody, _formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let src = EmbedSrc::new(cx.config.host(), &self.template);
        // Without any properties there is nothing to wait for.
        let src = match (&body.properties, &cx.query) {
            (Some(_), QueryState::Unsettled) => {
                return View::Loading.with_controls(authoring_controls(cx));
            }
            (Some(_), QueryState::Ready(query)) => src.with_query(Some(query.clone())),
            _ => src,
        };
        View::Embed {
            src: src.to_string(),
            widget: cx.widget.clone(),
            allow_fullscreen: false,
        }
        .with_controls(authoring_controls(cx))
    }
}

/// How a designable kind folds learner progress into its stored query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressMerge {
    None,
    FilledSlots,
}

/// Embed configured in design mode, showing its stored `body.query`.
#[derive(Clone, Debug)]
pub struct DesignableRenderer {
    template: SmolStr,
    merge: ProgressMerge,
}

impl DesignableRenderer {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.into(),
            merge: ProgressMerge::None,
        }
    }

    pub fn with_progress(mut self, merge: ProgressMerge) -> Self {
        self.merge = merge;
        self
    }

    /// The query to display, with learner progress merged in when presenting.
    pub fn display_query(&self, body: &WidgetBody, cx: &RenderContext<'_>) -> Option<CanonicalQuery> {
        let stored = body.query.as_deref()?;
        match self.merge {
            ProgressMerge::FilledSlots if !cx.is_authoring() => Some(merge_filled_slots(
                stored,
                cx.responses.get(FILLED_SLOTS),
            )),
            _ => Some(CanonicalQuery::from_encoded(stored)),
        }
    }

    /// Source for the design popup, based on the stored query.
    pub fn design_src(&self, body: &WidgetBody, host: &str) -> EmbedSrc {
        EmbedSrc::new(host, &self.template)
            .with_query(body.query.as_deref().map(CanonicalQuery::from_encoded))
            .in_design_mode()
    }
}

impl Renderer for DesignableRenderer {
    fn render(&self, body: &WidgetBody, _formatting: &Formatting, cx: &RenderContext<'_>) -> View {
        let src = EmbedSrc::new(cx.config.host(), &self.template)
            .with_query(self.display_query(body, cx));
        View::Embed {
            src: src.to_string(),
            widget: cx.widget.clone(),
            allow_fullscreen: true,
        }
        .with_controls(authoring_controls(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    use crate::assets::StepLocation;
    use crate::config::EmbedConfig;
    use crate::properties::PropertyTree;
    use crate::registry::{AuthoringExtras, ModeContext};
    use crate::response::{ResponseKey, ResponseMap, ResponseSlice, StepId, WidgetName};

    struct Fixture {
        widget: WidgetName,
        location: StepLocation,
        config: EmbedConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                widget: "Slots".into(),
                location: StepLocation::new("a", "f", "s1"),
                config: EmbedConfig::production(),
            }
        }

        fn cx<'a>(
            &'a self,
            responses: ResponseSlice<'a>,
            query: QueryState,
            mode: ModeContext<'a>,
        ) -> RenderContext<'a> {
            RenderContext {
                widget: &self.widget,
                location: &self.location,
                config: &self.config,
                responses,
                query,
                mode,
                extras: None,
                toggle_selected_content: None,
            }
        }
    }

    fn ignore_response(_: ResponseKey, _: Value) {}

    fn ignore_body(_: WidgetBody) {}

    fn presenting() -> ModeContext<'static> {
        ModeContext::Presentation {
            set_response: &ignore_response,
        }
    }

    fn authoring() -> ModeContext<'static> {
        ModeContext::Authoring {
            update_body: &ignore_body,
        }
    }

    #[test]
    fn test_src_format() {
        let src = EmbedSrc::new("https://slate.example.com/", "multiple-choice")
            .with_query(Some(CanonicalQuery::from_encoded("option=Red")));
        assert_eq!(
            src.to_string(),
            "https://slate.example.com/show?template=multiple-choice&option=Red"
        );
        assert_eq!(
            src.in_design_mode().to_string(),
            "https://slate.example.com/show?template=multiple-choice&option=Red&mode=design"
        );
        let bare = EmbedSrc::new("http://localhost:5000", "draw")
            .with_query(Some(CanonicalQuery::default()));
        assert_eq!(bare.to_string(), "http://localhost:5000/show?template=draw");
    }

    #[test]
    fn test_unsettled_embed_shows_loading() {
        let fx = Fixture::new();
        let body = WidgetBody::with_properties(PropertyTree::new().with("number", json!(3)));
        let renderer = EmbedRenderer::new("array");
        let formatting = Formatting::default();

        let cx = fx.cx(ResponseSlice::empty("Slots"), QueryState::Unsettled, presenting());
        assert_eq!(renderer.render(&body, &formatting, &cx), View::Loading);

        let ready = QueryState::Ready(CanonicalQuery::from_encoded("number=3"));
        let cx = fx.cx(ResponseSlice::empty("Slots"), ready, presenting());
        assert_eq!(
            renderer.render(&body, &formatting, &cx),
            View::Embed {
                src: "https://slate-eta.vercel.app/show?template=array&number=3".into(),
                widget: "Slots".into(),
                allow_fullscreen: false,
            }
        );
    }

    #[test]
    fn test_authoring_extras_add_controls() {
        let fx = Fixture::new();
        let mut cx = fx.cx(ResponseSlice::empty("Slots"), QueryState::Empty, authoring());
        cx.extras = Some(AuthoringExtras {
            asset_library: fx.location.clone(),
            select_as_active: true,
            design: true,
        });
        let view = DesignableRenderer::new("hotspots").render(
            &WidgetBody::default(),
            &Formatting::default(),
            &cx,
        );
        let View::Authoring { controls, .. } = view else {
            panic!("expected authoring controls");
        };
        assert_eq!(controls, [Control::OpenDesign, Control::SelectAsActive]);
    }

    #[test]
    fn test_filled_slots_merged_only_when_presenting() {
        let fx = Fixture::new();
        let step: StepId = "s1".into();
        let mut responses = ResponseMap::new();
        responses.record(
            &step,
            ResponseKey::property("Slots", FILLED_SLOTS),
            json!([{ "slot": "s1", "piece": "p1" }]),
        );
        let stored = "slot=%7B%22name%22%3A%22s1%22%7D&piece=%7B%22name%22%3A%22p1%22%7D";
        let body = WidgetBody::with_query(stored);
        let renderer = DesignableRenderer::new("drag-into-slots").with_progress(ProgressMerge::FilledSlots);

        let cx = fx.cx(responses.slice("s1", "Slots"), QueryState::Empty, presenting());
        let merged = renderer.display_query(&body, &cx).unwrap();
        let slot: Value = serde_json::from_str(&merged.get_all("slot")[0]).unwrap();
        assert_eq!(slot, json!({ "name": "s1", "piece": { "name": "p1" } }));

        let cx = fx.cx(responses.slice("s1", "Slots"), QueryState::Empty, authoring());
        assert_eq!(renderer.display_query(&body, &cx).unwrap().as_str(), stored);
    }

    #[test]
    fn test_design_src_from_stored_query() {
        let body = WidgetBody::with_query("image=a.png");
        let src = DesignableRenderer::new("hotspots").design_src(&body, "http://localhost:5000");
        assert_eq!(
            src.to_string(),
            "http://localhost:5000/show?template=hotspots&image=a.png&mode=design"
        );
    }
}
