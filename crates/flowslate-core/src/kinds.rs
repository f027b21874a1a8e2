//! The built-in content types.

use crate::embed::{DesignableRenderer, EmbedRenderer, ProgressMerge};
use crate::properties::{FieldSpec, PropertyKind, PropertySpec, ResponseProperty};
use crate::registry::{ContentTypeRegistry, ContentTypeRegistryBuilder, Designable, Plugin};
use crate::serializer::{DeclaredSerializer, MultipleChoiceSerializer, NumberlineSerializer};
use crate::widgets::{
    ButtonRenderer, DropdownRenderer, DynamicTextRenderer, ImageRenderer, ResponseBoxRenderer,
    ResponseTemplateRenderer, RichTextRenderer, VideoRenderer, WebpageRenderer,
};

/// Registry with every built-in kind declared.
pub fn default_registry() -> ContentTypeRegistry {
    embedded_kinds(local_kinds(ContentTypeRegistry::builder())).build()
}

/// Locally rendered kinds.
pub fn local_kinds(builder: ContentTypeRegistryBuilder) -> ContentTypeRegistryBuilder {
    builder
        .register("Text", Plugin::local("Text", RichTextRenderer, RichTextRenderer))
        .register("Prompt", Plugin::local("Prompt", RichTextRenderer, RichTextRenderer))
        .register("Question", Plugin::local("Question", RichTextRenderer, RichTextRenderer))
        .register(
            "DynamicText",
            Plugin::local("Dynamic Text", DynamicTextRenderer, DynamicTextRenderer).with_properties(vec![
                PropertySpec::new("formula", "Dynamic text formula", PropertyKind::Text),
            ]),
        )
        .register(
            "Button",
            Plugin::local("Button", ButtonRenderer, ButtonRenderer)
                .with_properties(vec![PropertySpec::string("text", "Button text")])
                .with_response_properties(vec![
                    ResponseProperty::scalar("clicked"),
                    ResponseProperty::scalar("clickFormulaSucceeded"),
                ]),
        )
        .register("Image", Plugin::local("Image", ImageRenderer, ImageRenderer))
        .register(
            "ShortResponseBox",
            Plugin::local(
                "Short response box",
                ResponseBoxRenderer::short(),
                ResponseBoxRenderer::short(),
            ),
        )
        .register(
            "LongResponseBox",
            Plugin::local(
                "Long response box",
                ResponseBoxRenderer::long(),
                ResponseBoxRenderer::long(),
            ),
        )
        .register(
            "MultiResponseBoxes",
            Plugin::local(
                "Multi response boxes",
                ResponseTemplateRenderer,
                ResponseTemplateRenderer,
            ),
        )
        .register(
            "Dropdown",
            Plugin::local("Dropdown", DropdownRenderer, DropdownRenderer).with_properties(vec![
                PropertySpec::list("options", "Options", PropertyKind::String),
            ]),
        )
        .register(
            "Webpage",
            Plugin::same("Webpage", WebpageRenderer)
                .with_properties(vec![PropertySpec::string("src", "Webpage URL")]),
        )
        .register(
            "Video",
            Plugin::same("Video", VideoRenderer).with_properties(vec![PropertySpec::string(
                "src",
                "YouTube embed URL or direct file URL",
            )]),
        )
}

fn simple(name: &str, kind: &str, template: &str, specs: Vec<PropertySpec>) -> Plugin {
    Plugin::delegated(name, EmbedRenderer::new(template), None)
        .with_serializer(DeclaredSerializer::new(kind, specs))
}

fn designable(name: &str, template: &str, renderer: DesignableRenderer) -> Plugin {
    Plugin::delegated(
        name,
        renderer,
        Some(Designable {
            template: template.into(),
        }),
    )
}

pub fn numberline_properties() -> Vec<PropertySpec> {
    vec![
        PropertySpec::list(
            "pieces",
            "Pieces available",
            PropertyKind::Object {
                items: vec![
                    FieldSpec::new("Name", PropertyKind::String),
                    FieldSpec::new("Length", PropertyKind::Number),
                ],
            },
        ),
        PropertySpec::boolean("makepiececopy", "Duplicate pieces that get dropped on numberline"),
        PropertySpec::list("scales", "Scale (zoom) levels", PropertyKind::Number),
        PropertySpec::number("initialScale", "Scale at the start"),
        PropertySpec::object(
            "range",
            "Range",
            vec![
                FieldSpec::new("Start", PropertyKind::Number),
                FieldSpec::new("End", PropertyKind::Number),
            ],
        ),
        PropertySpec::boolean("partsOfIntegers", "Show fractions instead of decimals under 1"),
        PropertySpec::number("slideBy", "Slide numberline forward and backward by (at scale=1)"),
    ]
}

pub fn multiple_choice_properties() -> Vec<PropertySpec> {
    vec![
        PropertySpec::string("question", "Question"),
        PropertySpec::list("option", "Choices", PropertyKind::String),
        PropertySpec::boolean("shuffle", "Shuffle order for students"),
        PropertySpec::number("optionsDisplayColumns", "Number of columns to display options in"),
    ]
}

/// Kinds rendered by the embedded document.
pub fn embedded_kinds(builder: ContentTypeRegistryBuilder) -> ContentTypeRegistryBuilder {
    builder
        .register(
            "Array",
            simple(
                "Array",
                "Array",
                "array",
                vec![PropertySpec::string("number", "Number of boxes").required()],
            )
            .with_response_properties(vec![
                ResponseProperty::scalar("columns"),
                ResponseProperty::scalar("rows"),
                ResponseProperty::scalar("remainder"),
            ]),
        )
        .register(
            "Numberline",
            Plugin::delegated("Numberline", EmbedRenderer::new("numberline"), None)
                .with_serializer(NumberlineSerializer::new(numberline_properties()))
                .with_response_properties(vec![
                    ResponseProperty::scalar("scale"),
                    ResponseProperty::scalar("range"),
                    ResponseProperty::records("pieces", &["title", "length", "line", "position"]),
                ]),
        )
        .register(
            "MultipleChoice",
            Plugin::delegated("Multiple choice answer", EmbedRenderer::new("multiple-choice"), None)
                .with_serializer(MultipleChoiceSerializer::new(multiple_choice_properties()))
                .with_response_properties(vec![ResponseProperty::records(
                    "selected",
                    &["id", "content", "index"],
                )]),
        )
        .register(
            "DragIntoSlots",
            designable(
                "Drag into slots",
                "drag-into-slots",
                DesignableRenderer::new("drag-into-slots").with_progress(ProgressMerge::FilledSlots),
            )
            .with_response_properties(vec![ResponseProperty::records("filledSlots", &["slot", "piece"])]),
        )
        .register(
            "InteractiveVideo",
            designable(
                "Interactive video",
                "interactive-video",
                DesignableRenderer::new("interactive-video"),
            )
            .with_response_properties(vec![ResponseProperty::records(
                "completedPrompts",
                &["label", "response"],
            )]),
        )
        .register(
            "Hotspots",
            designable("Hotspots", "hotspots", DesignableRenderer::new("hotspots")),
        )
        .register(
            "Die",
            simple("Die", "Die", "die", vec![PropertySpec::number("number", "Number on the die")]),
        )
        .register("Draw", simple("Draw", "Draw", "draw", Vec::new()))
        .register(
            "Timer",
            simple("Timer", "Timer", "timer", vec![PropertySpec::number("time", "Time")]),
        )
        .register(
            "HideZeroCards",
            simple(
                "Hide Zero Cards",
                "HideZeroCards",
                "hide-zero-cards",
                vec![PropertySpec::number("default", "Default number")],
            ),
        )
        .register(
            "ObjectLengthWithCentimeterCubes",
            simple(
                "Object Length With Centimeter Cubes",
                "ObjectLengthWithCentimeterCubes",
                "object-length-with-centimeter-cubes",
                vec![
                    PropertySpec::string("object", "Object Image URL"),
                    PropertySpec::boolean("fixedDropbox", "Can drop only inside fixed area").forced(),
                    PropertySpec::string("width", "Width"),
                ],
            ),
        )
        .register(
            "FillInTheBlanks",
            simple(
                "Fill in the blanks",
                "FillInTheBlanks",
                "fill-in-the-blanks",
                vec![
                    PropertySpec::string("pre", "Text before the blank"),
                    PropertySpec::string("post", "Text after the blank"),
                ],
            ),
        )
        .register(
            "ShortResponse",
            simple(
                "Short response",
                "ShortResponse",
                "short-response",
                vec![PropertySpec::string("prompt", "Prompt")],
            ),
        )
}
