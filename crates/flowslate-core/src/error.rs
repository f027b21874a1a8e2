//! Error types for flowslate operations.

use miette::Diagnostic;
use smol_str::SmolStr;

/// Main error type for flowslate operations.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum FlowslateError {
    /// A widget configuration could not be serialized.
    #[error(transparent)]
    #[diagnostic_source]
    Serialize(#[from] SerializeError),

    /// A formula could not be parsed or evaluated.
    #[error(transparent)]
    #[diagnostic_source]
    Formula(#[from] FormulaError),

    /// Design-mode round trip failed.
    #[error(transparent)]
    #[diagnostic_source]
    Design(#[from] DesignError),

    /// Asset store operation failed.
    #[error(transparent)]
    #[diagnostic_source]
    Asset(#[from] AssetError),

    /// No content type is registered under this name.
    #[error("unknown content type: {0}")]
    #[diagnostic(code(flowslate::registry::unknown_kind))]
    UnknownKind(SmolStr),
}

/// Errors raised while turning a property tree into a canonical query.
#[derive(thiserror::Error, Debug, Diagnostic, Clone, PartialEq)]
#[non_exhaustive]
pub enum SerializeError {
    /// A property the content type declares as required has no value.
    #[error("content type `{kind}` requires property `{property}`")]
    #[diagnostic(
        code(flowslate::serialize::missing_required),
        help("the embed stays in its loading state until the property is filled in")
    )]
    MissingRequired { kind: SmolStr, property: SmolStr },
}

/// Errors from the sandboxed formula evaluator.
#[derive(thiserror::Error, Debug, Diagnostic, Clone, PartialEq)]
#[non_exhaustive]
pub enum FormulaError {
    #[error("unexpected character `{found}` at offset {offset}")]
    #[diagnostic(code(flowslate::formula::lex))]
    UnexpectedChar { found: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    #[diagnostic(code(flowslate::formula::lex))]
    UnterminatedString { offset: usize },

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    #[diagnostic(code(flowslate::formula::parse))]
    Unexpected {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("formula nests deeper than {max_depth} levels")]
    #[diagnostic(code(flowslate::formula::depth))]
    TooDeep { max_depth: usize },

    #[error("formula has more than {max_nodes} operations")]
    #[diagnostic(code(flowslate::formula::length))]
    TooLong { max_nodes: usize },

    #[error("cannot apply `{op}` to {operand}")]
    #[diagnostic(code(flowslate::formula::type_error))]
    Type { op: &'static str, operand: String },

    #[error("division by zero")]
    #[diagnostic(code(flowslate::formula::div_zero))]
    DivisionByZero,
}

/// Design-mode round trip errors.
#[derive(thiserror::Error, Debug, Diagnostic, Clone, PartialEq)]
#[non_exhaustive]
pub enum DesignError {
    /// The content type has no design mode.
    #[error("content type `{0}` is not designable")]
    #[diagnostic(code(flowslate::design::not_designable))]
    NotDesignable(SmolStr),

    /// The session is not open.
    #[error("design session is not open")]
    #[diagnostic(code(flowslate::design::closed))]
    NotOpen,
}

/// Errors from the asset store collaborator.
#[derive(thiserror::Error, Debug, Diagnostic, Clone, PartialEq)]
#[non_exhaustive]
pub enum AssetError {
    #[error("upload of `{path}` failed: {reason}")]
    #[diagnostic(code(flowslate::assets::upload))]
    Upload { path: String, reason: String },

    #[error("delete of `{url}` failed: {reason}")]
    #[diagnostic(code(flowslate::assets::delete))]
    Delete { url: String, reason: String },

    #[error("listing `{prefix}` failed: {reason}")]
    #[diagnostic(code(flowslate::assets::list))]
    List { prefix: String, reason: String },

    #[error("`{0}` is not a storage download URL")]
    #[diagnostic(code(flowslate::assets::url))]
    NotAStorageUrl(String),

    #[error("file name `{0}` has no extension")]
    #[diagnostic(code(flowslate::assets::filename))]
    MissingExtension(String),
}
