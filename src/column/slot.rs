use crate::column::container::FieldContainer;
use crate::column::definition::FlexColumnDefinition;
use crate::core::{FlexError, Result};
use std::cell::OnceCell;
use std::sync::Arc;
use tracing::{Level, event};

/// The stored attribute behind a flex column, plus its lazily parsed contents.
///
/// The raw string is what the persistence layer reads and writes. The
/// container is created on first access and written back by [`sync`].
/// A slot is owned by exactly one record and is not `Sync`.
///
/// [`sync`]: FlexColumn::sync
#[derive(Debug, Clone, Default)]
pub struct FlexColumn {
    raw: Option<String>,
    contents: OnceCell<FieldContainer>,
}

impl FlexColumn {
    pub fn new(raw: Option<String>) -> Self {
        Self {
            raw,
            contents: OnceCell::new(),
        }
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self::new(Some(raw.into()))
    }

    /// The stored value as last loaded or synced. Pending container
    /// changes are not reflected until [`FlexColumn::sync`].
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Overwrites the stored value. Loaded contents are discarded and will be
    /// re-parsed from the new value on next access.
    pub fn replace_raw(&mut self, raw: Option<String>) {
        self.raw = raw;
        self.contents = OnceCell::new();
    }

    pub fn is_loaded(&self) -> bool {
        self.contents.get().is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.contents.get().is_some_and(FieldContainer::is_dirty)
    }

    /// Loaded contents, if any, without triggering a load.
    pub fn peek(&self) -> Option<&FieldContainer> {
        self.contents.get()
    }

    pub fn contents(&self, definition: &Arc<FlexColumnDefinition>) -> Result<&FieldContainer> {
        if let Some(container) = self.contents.get() {
            return Ok(container);
        }
        let loaded = FieldContainer::load(Arc::clone(definition), self.raw.as_deref())?;
        Ok(self.contents.get_or_init(|| loaded))
    }

    pub fn contents_mut(
        &mut self,
        definition: &Arc<FlexColumnDefinition>,
    ) -> Result<&mut FieldContainer> {
        if self.contents.get().is_none() {
            let loaded = FieldContainer::load(Arc::clone(definition), self.raw.as_deref())?;
            self.contents = OnceCell::from(loaded);
        }
        self.contents
            .get_mut()
            .ok_or_else(|| FlexError::malformed(definition.column_name(), "contents unavailable"))
    }

    /// Writes dirty contents back into the stored value.
    /// Returns whether the stored value changed.
    pub fn sync(&mut self) -> Result<bool> {
        let Some(container) = self.contents.get_mut() else {
            return Ok(false);
        };
        if !container.is_dirty() {
            return Ok(false);
        }

        let serialized = container.serialize()?;
        event!(
            Level::DEBUG,
            column = %container.column_name(),
            bytes = serialized.len(),
            "flex column synced"
        );
        container.mark_clean();
        self.raw = Some(serialized);
        Ok(true)
    }

    /// Syncs and returns the value to persist.
    pub fn stored_value(&mut self) -> Result<Option<String>> {
        self.sync()?;
        Ok(self.raw.clone())
    }
}
