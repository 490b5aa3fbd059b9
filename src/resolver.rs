//! Reference resolution.
//!
//! Content refers to assets and other documents by URL, relative to the
//! document it appears in. Once those entities carry a remote id, the URLs
//! are rewritten into [`Reference`]s. Misses are never errors: the raw URL
//! stays in place and a warning is collected for the document.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::{
    ProcessingState, Stage,
    rich_text::{BlockType, Content, Element, RichTextMapper, Span, SpanType},
    state::{Document, Fields},
    warn_document, warning,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Media,
    Document,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: String,
    pub link_type: LinkType,
}

/// Looks URLs up in the indices of one state, relative to one base URL.
pub struct ReferenceResolver<'s> {
    state: &'s ProcessingState,
    base: Option<&'s Url>,
}

impl<'s> ReferenceResolver<'s> {
    pub fn new(state: &'s ProcessingState, base: Option<&'s Url>) -> Self {
        Self { state, base }
    }

    /// Assets are looked up before documents. An entity that is known but has
    /// no remote id yet resolves to nothing.
    pub fn resolve(&self, raw: Option<&str>) -> Option<Reference> {
        let raw = raw.filter(|raw| !raw.is_empty())?;
        let url = match self.base {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        };
        let url = match url {
            Ok(url) => url,
            Err(error) => {
                warn_document!("cannot parse reference {raw:?}: {error}");
                return None;
            }
        };
        let key = url.as_str();
        let (id, link_type) = if let Some(asset) = self.state.assets().get(key) {
            (asset.id.as_ref(), LinkType::Media)
        } else if let Some(document) = self.state.document(key) {
            (document.id.as_ref(), LinkType::Document)
        } else {
            warn_document!("unresolved reference {key}");
            return None;
        };
        match id {
            Some(id) => Some(Reference {
                id: id.clone(),
                link_type,
            }),
            None => {
                warn_document!("{link_type:?} {key} has no remote id yet");
                None
            }
        }
    }
}

/// Rewrite image elements and hyperlink spans that resolve. Anything that
/// doesn't is returned untouched.
pub fn resolve_rich_text_references(resolver: &ReferenceResolver<'_>, content: Content) -> Content {
    RichTextMapper::new()
        .element(|mut element: Element| {
            if element.kind == BlockType::Image
                && let Some(reference) = resolver.resolve(element.url.as_deref())
            {
                element.url = None;
                element.id = Some(reference.id);
            }
            element
        })
        .span(|mut span: Span| {
            if span.kind == SpanType::Hyperlink
                && let Some(data) = span.data.as_mut()
                && let Some(reference) = resolver.resolve(data.url.as_deref())
            {
                data.url = None;
                data.id = Some(reference.id);
                data.link_type = Some(reference.link_type);
            }
            span
        })
        .map(content)
}

/// Replace `name` with what `resolve` returns for it. Missing fields and
/// fields `resolve` gives nothing for are left as they are.
pub fn resolve_field_with<F>(resolve: F, name: &str, mut fields: Fields) -> Fields
where
    F: FnOnce(&Value) -> Option<Value>,
{
    if let Some(resolved) = fields.get(name).and_then(resolve) {
        fields.insert(name.to_owned(), resolved);
    }
    fields
}

/// Field level resolution primitives handed to a [`ReferenceMapper`].
pub struct Resolvers<'s> {
    resolver: ReferenceResolver<'s>,
}

impl<'s> Resolvers<'s> {
    pub fn new(resolver: ReferenceResolver<'s>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &ReferenceResolver<'s> {
        &self.resolver
    }

    /// The field holds a URL string; it becomes a reference object.
    pub fn link_field(&self, name: &str, fields: Fields) -> Fields {
        resolve_field_with(
            |value| {
                let reference = self.resolver.resolve(value.as_str())?;
                serde_json::to_value(reference).ok()
            },
            name,
            fields,
        )
    }

    /// The field holds rich text; its images and hyperlinks are resolved.
    pub fn rich_text_field(&self, name: &str, fields: Fields) -> Fields {
        resolve_field_with(
            |value| {
                let content = match Content::deserialize(value) {
                    Ok(content) => content,
                    Err(error) => {
                        warn_document!("field {name} is not rich text: {error}");
                        return None;
                    }
                };
                serde_json::to_value(resolve_rich_text_references(&self.resolver, content)).ok()
            },
            name,
            fields,
        )
    }
}

/// Schema specific reference substitution.
pub trait ReferenceMapper {
    fn map_references(&self, document: Document, resolvers: &Resolvers<'_>) -> Document;
}

impl<F> ReferenceMapper for F
where
    F: Fn(Document, &Resolvers<'_>) -> Document,
{
    fn map_references(&self, document: Document, resolvers: &Resolvers<'_>) -> Document {
        self(document, resolvers)
    }
}

/// Resolve the references of every document, each relative to its own
/// source.
pub fn resolve_references<M>(mapper: M) -> Stage
where
    M: ReferenceMapper + Send + Sync + 'static,
{
    let mapper = Arc::new(mapper);
    Stage::new("resolve_references", move |state: ProcessingState| {
        let mapper = mapper.clone();
        async move {
            let resolved = join_all(state.documents().iter().map(|document| {
                warning::for_document(async {
                    let resolvers =
                        Resolvers::new(ReferenceResolver::new(&state, document.source.as_ref()));
                    mapper.map_references(document.clone(), &resolvers)
                })
            }))
            .await;
            let documents = resolved
                .into_iter()
                .map(|(document, warnings)| {
                    for warning in warnings {
                        warn!(
                            document = document.key().as_deref().unwrap_or("<unknown>"),
                            %warning,
                            "reference left unresolved"
                        );
                    }
                    document
                })
                .collect();
            Ok(state.with_documents(documents))
        }
    })
}
