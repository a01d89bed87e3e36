//! Dashboard: the apps a viewer can see, newest first.

use std::collections::HashSet;
use std::rc::Rc;

use super::{LocalList, ViewScope};
use crate::Result;
use crate::models::{App, NewApp, Permission};
use crate::shell::Viewer;
use crate::storage::{Direction, Query, RecordStore, RecordStoreExt};

pub struct DashboardView {
    store: Rc<dyn RecordStore>,
    viewer: Viewer,
    scope: ViewScope,
    apps: LocalList<App>,
}

impl DashboardView {
    pub fn new(store: Rc<dyn RecordStore>, viewer: Viewer) -> Self {
        Self {
            store,
            viewer,
            scope: ViewScope::new(),
            apps: LocalList::default(),
        }
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    pub fn apps(&self) -> &[App] {
        self.apps.items()
    }

    /// Load the visible apps. Returns `false` when the result arrived stale.
    ///
    /// Admins see every app; developers see the apps they hold a grant for.
    pub fn load(&mut self) -> Result<bool> {
        let ticket = self.scope.begin();
        let newest_first = Query::new().order_by("created_at", Direction::Descending);

        let apps = if self.viewer.is_admin() {
            self.store.select_records::<App>(&newest_first)?
        } else {
            let granted: HashSet<String> = self
                .store
                .select_records::<Permission>(&Query::new().eq("user_id", self.viewer.user_id()))?
                .into_iter()
                .map(|p| p.app_id)
                .collect();
            if granted.is_empty() {
                Vec::new()
            } else {
                self.store
                    .select_records::<App>(&newest_first)?
                    .into_iter()
                    .filter(|app| granted.contains(&app.id))
                    .collect()
            }
        };

        match ticket.accept(apps) {
            Some(apps) => {
                tracing::debug!(count = apps.len(), "dashboard loaded");
                self.apps.replace_all(apps);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Register an app (admin only) and put it at the top of the list.
    pub fn add_app(&mut self, mut new_app: NewApp) -> Result<App> {
        self.viewer.require_admin("adding an app")?;
        new_app.validate()?;

        let app: App = self.store.insert_record(&new_app)?;
        tracing::info!(app_id = %app.id, name = %app.name, "added app");
        self.apps.prepend(app.clone()).confirm(None);
        Ok(app)
    }

    /// Delete an app (admin only). Its controls and grants go with it.
    pub fn remove_app(&mut self, app_id: &str) -> Result<()> {
        self.viewer.require_admin("removing an app")?;

        let pending = self.apps.remove_where(|app| app.id == app_id);
        match self.store.delete_record::<App>(app_id) {
            Ok(()) => {
                if let Some(pending) = pending {
                    pending.confirm(None);
                }
                tracing::info!(app_id, "removed app");
                Ok(())
            }
            Err(e) => {
                if let Some(pending) = pending {
                    pending.rollback();
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::{NewPermission, Platform, Role};
    use crate::storage::{Row, SqliteStore, Table};
    use crate::test_utils::{TestEnv, seed_user, viewer_for};
    use std::cell::RefCell;

    fn new_app(name: &str) -> NewApp {
        NewApp {
            name: name.to_string(),
            platform: Platform::Android,
            app_url: None,
            config_filename: format!("{}.json", name.to_lowercase()),
        }
    }

    fn setup() -> (TestEnv, Rc<SqliteStore>, Viewer, Viewer) {
        let env = TestEnv::new();
        let store = env.open_store();
        let admin = viewer_for(&seed_user(&store, "admin@example.com", Role::Admin));
        let dev = viewer_for(&seed_user(&store, "dev@example.com", Role::Developer));
        (env, store, admin, dev)
    }

    #[test]
    fn test_admin_sees_all_newest_first() {
        let (_env, store, admin, _dev) = setup();
        let mut view = DashboardView::new(store, admin);

        view.add_app(new_app("First")).unwrap();
        view.add_app(new_app("Second")).unwrap();
        let names: Vec<_> = view.apps().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Second", "First"]);

        assert!(view.load().unwrap());
        let names: Vec<_> = view.apps().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Second", "First"]);
    }

    #[test]
    fn test_developer_sees_granted_apps_only() {
        let (_env, store, admin, dev) = setup();
        let mut admin_view = DashboardView::new(store.clone(), admin);
        let granted = admin_view.add_app(new_app("Granted")).unwrap();
        admin_view.add_app(new_app("Hidden")).unwrap();

        let mut dev_view = DashboardView::new(store.clone(), dev.clone());
        dev_view.load().unwrap();
        assert!(dev_view.apps().is_empty());

        store
            .insert_record::<Permission, _>(&NewPermission {
                user_id: dev.user_id().to_string(),
                app_id: granted.id.clone(),
            })
            .unwrap();
        dev_view.load().unwrap();
        assert_eq!(dev_view.apps().len(), 1);
        assert_eq!(dev_view.apps()[0].id, granted.id);
    }

    #[test]
    fn test_developer_cannot_add_or_remove() {
        let (_env, store, _admin, dev) = setup();
        let mut view = DashboardView::new(store, dev);
        assert!(matches!(view.add_app(new_app("X")), Err(Error::Forbidden(_))));
        assert!(matches!(view.remove_app("x"), Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_add_app_validation_happens_before_insert() {
        let (_env, store, admin, _dev) = setup();
        let mut view = DashboardView::new(store, admin);
        let mut bad = new_app("Bad");
        bad.config_filename = "../escape.json".to_string();

        assert!(matches!(view.add_app(bad), Err(Error::Validation(_))));
        view.load().unwrap();
        assert!(view.apps().is_empty());
    }

    #[test]
    fn test_remove_app() {
        let (_env, store, admin, _dev) = setup();
        let mut view = DashboardView::new(store, admin);
        let app = view.add_app(new_app("Doomed")).unwrap();

        view.remove_app(&app.id).unwrap();
        assert!(view.apps().is_empty());
        view.load().unwrap();
        assert!(view.apps().is_empty());

        // Removing again is not an error.
        view.remove_app(&app.id).unwrap();
    }

    /// Store that leaves the view while a select is in flight.
    struct LeavingStore {
        inner: Rc<SqliteStore>,
        scope: RefCell<Option<ViewScope>>,
    }

    impl RecordStore for LeavingStore {
        fn insert(&self, table: Table, row: Row) -> Result<Row> {
            self.inner.insert(table, row)
        }
        fn select(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
            if let Some(scope) = self.scope.borrow().as_ref() {
                scope.leave();
            }
            self.inner.select(table, query)
        }
        fn update(&self, table: Table, id: &str, patch: Row) -> Result<Row> {
            self.inner.update(table, id, patch)
        }
        fn delete(&self, table: Table, id: &str) -> Result<()> {
            self.inner.delete(table, id)
        }
        fn location(&self) -> String {
            self.inner.location()
        }
        fn backend_type(&self) -> &'static str {
            "leaving"
        }
    }

    #[test]
    fn test_stale_load_is_dropped() {
        let (_env, store, admin, _dev) = setup();
        DashboardView::new(store.clone(), admin.clone())
            .add_app(new_app("Late"))
            .unwrap();

        let leaving = Rc::new(LeavingStore {
            inner: store,
            scope: RefCell::new(None),
        });
        let mut view = DashboardView::new(leaving.clone(), admin);
        *leaving.scope.borrow_mut() = Some(view.scope().clone());

        assert!(!view.load().unwrap());
        assert!(view.apps().is_empty());
    }
}
