//! Page documents backed by HTML source.
//! Each snapshot is one `kuchiki` parse; every selector of a tick runs
//! against that same tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use kuchiki::traits::*;
use kuchiki::{ElementData, NodeDataRef, NodeRef, Selectors};
use log::debug;

use crate::extract::ExtractError;
use crate::platform::{Document, Page};

/// Check that a selector compiles, without touching any document.
pub fn validate_selector(selector: &str) -> Result<(), ExtractError> {
    Selectors::compile(selector)
        .map(|_| ())
        .map_err(|()| ExtractError::InvalidSelector(selector.to_string()))
}

/// A parsed page. Queries never see later changes to the source it came from.
pub struct ParsedPage {
    root: NodeRef,
}

impl ParsedPage {
    pub fn parse(html: &str) -> Self {
        Self {
            root: kuchiki::parse_html().one(html),
        }
    }

    fn select_with<F>(&self, selector: &str, read: F) -> Result<Vec<String>, ExtractError>
    where
        F: Fn(&NodeDataRef<ElementData>) -> Option<String>,
    {
        let matches = self
            .root
            .select(selector)
            .map_err(|()| ExtractError::InvalidSelector(selector.to_string()))?;
        Ok(matches.filter_map(|element| read(&element)).collect())
    }
}

impl Page for ParsedPage {
    fn select_text(&self, selector: &str) -> Result<Vec<String>, ExtractError> {
        self.select_with(selector, text_of)
    }

    fn select_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, ExtractError> {
        self.select_with(selector, |e| attribute_of(e, attribute))
    }
}

fn text_of(element: &NodeDataRef<ElementData>) -> Option<String> {
    Some(element.as_node().text_contents())
}

fn attribute_of(element: &NodeDataRef<ElementData>, attribute: &str) -> Option<String> {
    element
        .attributes
        .borrow()
        .get(attribute)
        .map(str::to_string)
}

/// An in-memory page whose markup can be swapped out wholesale.
#[derive(Debug, Default)]
pub struct HtmlDocument {
    source: RwLock<String>,
}

impl HtmlDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            source: RwLock::new(html.into()),
        }
    }

    /// Replace the page markup, as a re-render of the page would.
    pub fn replace(&self, html: impl Into<String>) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = html.into();
    }
}

impl Document for HtmlDocument {
    fn snapshot(&self) -> Result<Box<dyn Page>, ExtractError> {
        let source = self.source.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Box::new(ParsedPage::parse(&source)))
    }
}

/// A page on disk, re-read on every snapshot so external rewrites of the
/// file show up on the next tick.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String, ExtractError> {
        fs::read_to_string(&self.path).map_err(|e| {
            debug!("Failed to read page snapshot {}: {}", self.path.display(), e);
            ExtractError::DocumentUnavailable(format!("{}: {}", self.path.display(), e))
        })
    }
}

impl Document for FileDocument {
    fn snapshot(&self) -> Result<Box<dyn Page>, ExtractError> {
        Ok(Box::new(ParsedPage::parse(&self.read()?)))
    }
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
