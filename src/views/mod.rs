//! Views driven by the CLI: login, dashboard, app detail, and developers.
//!
//! Each view owns a [`ViewScope`] and holds its records in [`LocalList`]s.
//! Loads are tagged with a [`Ticket`]; a result whose ticket is no longer
//! current (the view was left, or a newer load started) is dropped instead of
//! applied. Mutations apply an optimistic change to the local list and either
//! confirm it with the stored record or roll it back when the store refuses.

pub mod dashboard;
pub mod detail;
pub mod developers;
pub mod login;

pub use dashboard::DashboardView;
pub use detail::{AppDetailView, ConfigStatus, ControlView, LiveValue};
pub use developers::{AppAccess, DeveloperRow, DevelopersView};
pub use login::{LoginForm, LoginView};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::models::Permission;
use crate::shell::Viewer;
use crate::storage::{Query, RecordStore, RecordStoreExt};
use crate::Result;

#[derive(Debug, Default)]
struct ScopeState {
    generation: AtomicU64,
    mounted: AtomicBool,
}

/// Lifetime of one view instance.
#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    state: Arc<ScopeState>,
}

impl ViewScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load. Older tickets stop being current.
    pub fn begin(&self) -> Ticket {
        self.state.mounted.store(true, Ordering::SeqCst);
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            state: Arc::clone(&self.state),
            generation,
        }
    }

    /// Leave the view. Every outstanding ticket stops being current.
    pub fn leave(&self) {
        self.state.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.state.mounted.load(Ordering::SeqCst)
    }
}

/// Tag of one load.
#[derive(Debug, Clone)]
pub struct Ticket {
    state: Arc<ScopeState>,
    generation: u64,
}

impl Ticket {
    pub fn is_current(&self) -> bool {
        self.state.mounted.load(Ordering::SeqCst)
            && self.state.generation.load(Ordering::SeqCst) == self.generation
    }

    /// Pass `value` through if the ticket is still current.
    pub fn accept<T>(&self, value: T) -> Option<T> {
        if self.is_current() {
            Some(value)
        } else {
            tracing::debug!(generation = self.generation, "dropping stale view result");
            None
        }
    }
}

/// Records held by a view, with optimistic edits.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalList<T> {
    items: Vec<T>,
}

impl<T> Default for LocalList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

enum Undo<T> {
    Remove(usize),
    Restore(usize, T),
}

impl<T> LocalList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.items.iter().find(|item| pred(item))
    }

    /// Replace every item (after a load).
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
    }

    /// Replace the first item matching `pred`. Returns whether one matched.
    pub fn replace_where(&mut self, pred: impl Fn(&T) -> bool, item: T) -> bool {
        match self.items.iter().position(|existing| pred(existing)) {
            Some(index) => {
                self.items[index] = item;
                true
            }
            None => false,
        }
    }

    /// Optimistically insert `item` at the front.
    pub fn prepend(&mut self, item: T) -> Pending<'_, T> {
        self.items.insert(0, item);
        Pending {
            list: self,
            undo: Some(Undo::Remove(0)),
        }
    }

    /// Optimistically insert `item` at the back.
    pub fn append(&mut self, item: T) -> Pending<'_, T> {
        self.items.push(item);
        let index = self.items.len() - 1;
        Pending {
            list: self,
            undo: Some(Undo::Remove(index)),
        }
    }

    /// Optimistically remove the first item matching `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<Pending<'_, T>> {
        let index = self.items.iter().position(|item| pred(item))?;
        let removed = self.items.remove(index);
        Some(Pending {
            list: self,
            undo: Some(Undo::Restore(index, removed)),
        })
    }
}

impl<'a, T> IntoIterator for &'a LocalList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// An optimistic change awaiting the store's answer.
///
/// Dropping an unresolved change rolls it back.
#[must_use = "an unresolved change is rolled back when dropped"]
pub struct Pending<'a, T> {
    list: &'a mut LocalList<T>,
    undo: Option<Undo<T>>,
}

impl<T> Pending<'_, T> {
    /// Keep the change, optionally swapping the placeholder for the stored record.
    pub fn confirm(mut self, stored: Option<T>) {
        if let (Some(Undo::Remove(index)), Some(stored)) = (self.undo.take(), stored) {
            self.list.items[index] = stored;
        }
    }

    /// The item taken out by a pending removal.
    pub fn removed(&self) -> Option<&T> {
        match &self.undo {
            Some(Undo::Restore(_, item)) => Some(item),
            _ => None,
        }
    }

    /// Undo the change.
    pub fn rollback(mut self) {
        self.undo_now();
    }

    fn undo_now(&mut self) {
        match self.undo.take() {
            Some(Undo::Remove(index)) => {
                self.list.items.remove(index);
            }
            Some(Undo::Restore(index, item)) => {
                self.list.items.insert(index, item);
            }
            None => {}
        }
    }
}

impl<T> Drop for Pending<'_, T> {
    fn drop(&mut self) {
        self.undo_now();
    }
}

/// Whether `viewer` may see and configure `app_id`.
pub(crate) fn can_access_app(
    store: &dyn RecordStore,
    viewer: &Viewer,
    app_id: &str,
) -> Result<bool> {
    if viewer.is_admin() {
        return Ok(true);
    }
    let grants = store.select_records::<Permission>(
        &Query::new()
            .eq("user_id", viewer.user_id())
            .eq("app_id", app_id),
    )?;
    Ok(grants.iter().any(|p| p.covers(viewer.user_id(), app_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_current_until_newer_load() {
        let scope = ViewScope::new();
        let first = scope.begin();
        assert!(first.is_current());

        let second = scope.begin();
        assert!(!first.is_current());
        assert_eq!(first.accept(1), None);
        assert_eq!(second.accept(2), Some(2));
    }

    #[test]
    fn test_leave_invalidates_tickets() {
        let scope = ViewScope::new();
        let ticket = scope.begin();
        let from_thread = {
            let scope = scope.clone();
            std::thread::spawn(move || scope.leave())
        };
        from_thread.join().unwrap();

        assert!(!scope.is_mounted());
        assert_eq!(ticket.accept("late"), None);

        // Re-entering starts fresh.
        assert!(scope.begin().is_current());
    }

    #[test]
    fn test_prepend_confirm_replaces_placeholder() {
        let mut list = LocalList::new(vec![2, 3]);
        list.prepend(0).confirm(Some(1));
        assert_eq!(list.items(), &[1, 2, 3]);

        list.append(9).confirm(None);
        assert_eq!(list.items(), &[1, 2, 3, 9]);
    }

    #[test]
    fn test_rollback_restores_position() {
        let mut list = LocalList::new(vec!["a", "b", "c"]);
        list.remove_where(|s| *s == "b").unwrap().rollback();
        assert_eq!(list.items(), &["a", "b", "c"]);

        list.append("d").rollback();
        assert_eq!(list.items(), &["a", "b", "c"]);

        assert!(list.remove_where(|s| *s == "z").is_none());
    }

    #[test]
    fn test_unresolved_change_rolls_back_on_drop() {
        let mut list = LocalList::new(vec![1]);
        {
            let _pending = list.prepend(0);
        }
        assert_eq!(list.items(), &[1]);

        let removed = list.remove_where(|n| *n == 1);
        drop(removed);
        assert_eq!(list.items(), &[1]);
    }

    #[test]
    fn test_replace_where() {
        let mut list = LocalList::new(vec![1, 2]);
        assert!(list.replace_where(|n| *n == 2, 20));
        assert!(!list.replace_where(|n| *n == 3, 30));
        assert_eq!(list.items(), &[1, 20]);
    }
}
