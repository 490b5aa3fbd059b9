//! Structured rich text and a rewrite engine over it.
//!
//! Content is an ordered list of [`Element`]s, each optionally carrying
//! inline [`Span`]s. [`RichTextMapper`] walks the content, rewriting spans
//! first and then their element. A rewrite may keep, replace, multiply or
//! drop the value it receives (see [`Rewrite`]).

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{resolver::LinkType, state::Fields};

pub type Content = Vec<Element>;

macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $tag:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)*
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $tag,)*
                    Self::Other(tag) => tag,
                }
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $($tag => Self::$variant,)*
                    other => Self::Other(other.to_owned()),
                })
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                match value.parse() {
                    Ok(parsed) => parsed,
                    Err(infallible) => match infallible {},
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $name::Other(tag) => tag,
                    known => known.as_str().to_owned(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

tag_enum! {
    /// Block type of an element.
    BlockType {
        Heading1 => "heading1",
        Heading2 => "heading2",
        Heading3 => "heading3",
        Heading4 => "heading4",
        Heading5 => "heading5",
        Heading6 => "heading6",
        Paragraph => "paragraph",
        Preformatted => "preformatted",
        ListItem => "list-item",
        OrderedListItem => "o-list-item",
        Image => "image",
        Embed => "embed",
    }
}

tag_enum! {
    /// Type of an inline span.
    SpanType {
        Strong => "strong",
        Em => "em",
        Hyperlink => "hyperlink",
        Label => "label",
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spans: Option<Vec<Span>>,
    /// Source of an image element until it is resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Remote asset id of a resolved image element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(flatten)]
    pub rest: Fields,
}

impl Element {
    pub fn new(kind: BlockType) -> Self {
        Self {
            kind,
            text: None,
            spans: None,
            url: None,
            id: None,
            alt: None,
            rest: Fields::new(),
        }
    }

    pub fn text(kind: BlockType, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            spans: Some(Vec::new()),
            ..Self::new(kind)
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new(BlockType::Image)
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: SpanType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SpanData>,
}

impl Span {
    pub fn hyperlink(start: usize, end: usize, url: impl Into<String>) -> Self {
        Self {
            start,
            end,
            kind: SpanType::Hyperlink,
            data: Some(SpanData {
                url: Some(url.into()),
                ..Default::default()
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SpanData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<LinkType>,
    #[serde(flatten)]
    pub rest: Fields,
}

/// Outcome of a single rewrite.
#[derive(Debug, Clone, PartialEq)]
pub enum Rewrite<T> {
    Keep(T),
    Many(Vec<T>),
    Remove,
}

impl<T> From<T> for Rewrite<T> {
    fn from(value: T) -> Self {
        Self::Keep(value)
    }
}

impl<T> From<Vec<T>> for Rewrite<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Many(values)
    }
}

impl<T> From<Option<T>> for Rewrite<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Remove, Self::Keep)
    }
}

impl<T> IntoIterator for Rewrite<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::Keep(value) => vec![value].into_iter(),
            Self::Many(values) => values.into_iter(),
            Self::Remove => Vec::new().into_iter(),
        }
    }
}

pub fn keep<T>(value: T) -> Rewrite<T> {
    Rewrite::Keep(value)
}

pub struct RichTextMapper<E, S> {
    element: E,
    span: S,
}

pub type IdentityMapper =
    RichTextMapper<fn(Element) -> Rewrite<Element>, fn(Span) -> Rewrite<Span>>;

impl IdentityMapper {
    pub fn new() -> Self {
        Self {
            element: keep,
            span: keep,
        }
    }
}

impl Default for IdentityMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, S> RichTextMapper<E, S> {
    pub fn element<F, R>(self, element: F) -> RichTextMapper<F, S>
    where
        F: Fn(Element) -> R,
        R: Into<Rewrite<Element>>,
    {
        RichTextMapper {
            element,
            span: self.span,
        }
    }

    pub fn span<F, R>(self, span: F) -> RichTextMapper<E, F>
    where
        F: Fn(Span) -> R,
        R: Into<Rewrite<Span>>,
    {
        RichTextMapper {
            element: self.element,
            span,
        }
    }
}

impl<E, S, RE, RS> RichTextMapper<E, S>
where
    E: Fn(Element) -> RE,
    RE: Into<Rewrite<Element>>,
    S: Fn(Span) -> RS,
    RS: Into<Rewrite<Span>>,
{
    pub fn map(&self, content: Content) -> Content {
        content
            .into_iter()
            .flat_map(|mut element| {
                // only elements that already carry spans get them rewritten
                if let Some(spans) = element.spans.take() {
                    element.spans = Some(
                        spans
                            .into_iter()
                            .flat_map(|span| -> Rewrite<Span> { (self.span)(span).into() })
                            .collect(),
                    );
                }
                let rewrite: Rewrite<Element> = (self.element)(element).into();
                rewrite
            })
            .collect()
    }
}

pub fn map_rich_text<E, S, RE, RS>(mapper: &RichTextMapper<E, S>, content: Content) -> Content
where
    E: Fn(Element) -> RE,
    RE: Into<Rewrite<Element>>,
    S: Fn(Span) -> RS,
    RS: Into<Rewrite<Span>>,
{
    mapper.map(content)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource<'c> {
    pub url: &'c str,
    pub alt: Option<&'c str>,
}

/// Sources of all unresolved image elements, in document order.
pub fn image_sources(content: &[Element]) -> Vec<ImageSource<'_>> {
    content
        .iter()
        .filter(|element| element.kind == BlockType::Image)
        .filter_map(|element| {
            element.url.as_deref().map(|url| ImageSource {
                url,
                alt: element.alt.as_deref(),
            })
        })
        .collect()
}

/// Read a rich text field out of a field bag.
pub fn from_field(fields: &Fields, name: &str) -> Option<Result<Content, serde_json::Error>> {
    fields
        .get(name)
        .map(|value| serde_json::from_value(value.clone()))
}
