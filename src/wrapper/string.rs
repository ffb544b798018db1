use scraper::{Html, Selector};
use tracing::debug;

use crate::error::{Error, Result};

/// Static markup with CSS queries over the parsed result.
///
/// Queries go through a full HTML parser, so they follow browser selector
/// semantics rather than the render-tree engine used by [`crate::Wrapper`].
#[derive(Debug, Clone, PartialEq)]
pub struct StringWrapper {
    fragments: Vec<String>,
}

impl StringWrapper {
    pub(crate) fn from_markup(markup: String) -> Self {
        let fragments = if markup.is_empty() { Vec::new() } else { vec![markup] };
        Self { fragments }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Outer markup of every selected fragment, concatenated.
    pub fn html(&self) -> String {
        self.fragments.concat()
    }

    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| {
                Html::parse_fragment(f)
                    .root_element()
                    .text()
                    .collect::<String>()
            })
            .collect()
    }

    /// Elements matching `selector` inside the selected fragments.
    pub fn find(&self, selector: &str) -> Result<StringWrapper> {
        let parsed = Selector::parse(selector)
            .map_err(|e| Error::Selector(format!("{selector}: {e:?}")))?;
        let mut fragments = Vec::new();
        for fragment in &self.fragments {
            let html = Html::parse_fragment(fragment);
            fragments.extend(html.select(&parsed).map(|el| el.html()));
        }
        debug!(selector, matched = fragments.len(), "string find");
        Ok(StringWrapper { fragments })
    }

    /// Attribute of the first selected element.
    pub fn attr(&self, name: &str) -> Option<String> {
        let first = self.fragments.first()?;
        let html = Html::parse_fragment(first);
        let root = html.root_element();
        let element = root.child_elements().next()?;
        element.value().attr(name).map(str::to_string)
    }
}
