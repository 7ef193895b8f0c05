//! Folder navigation over Drive listings.
//!
//! Every navigation action issues a [`ListingRequest`] tagged with a fresh
//! generation. The path and entries change only when the request with the
//! latest generation completes successfully; anything older is dropped.

use super::client::FolderLister;
use super::entry::{DriveEntry, EntryKind};
use super::DriveError;

pub const ROOT_FOLDER_ID: &str = "root";
pub const ROOT_FOLDER_NAME: &str = "My Drive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub id: String,
    pub name: String,
}

impl Breadcrumb {
    fn root() -> Self {
        Self {
            id: ROOT_FOLDER_ID.to_string(),
            name: ROOT_FOLDER_NAME.to_string(),
        }
    }
}

/// Breadcrumb path from the root to the current folder (never empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    path: Vec<Breadcrumb>,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            path: vec![Breadcrumb::root()],
        }
    }
}

impl NavigationState {
    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        &self.path
    }

    pub fn current_folder_id(&self) -> &str {
        self.current().id.as_str()
    }

    pub fn current(&self) -> &Breadcrumb {
        // path always holds at least the root
        &self.path[self.path.len() - 1]
    }

    fn entered(&self, entry: &DriveEntry) -> Vec<Breadcrumb> {
        let mut path = self.path.clone();
        path.push(Breadcrumb {
            id: entry.id.clone(),
            name: entry.name.clone(),
        });
        path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub generation: u64,
    pub folder_id: String,
    path: Vec<Breadcrumb>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingOutcome {
    Applied,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListingStatus {
    #[default]
    Idle,
    Loading,
    Failed(String),
}

#[derive(Debug)]
pub enum Selection {
    /// A folder was chosen; run this listing.
    Navigate(ListingRequest),
    /// An image was chosen; browsing is over.
    Picked(DriveEntry),
    Ignored,
}

#[derive(Debug, Default)]
pub struct Navigator {
    state: NavigationState,
    entries: Vec<DriveEntry>,
    generation: u64,
    status: ListingStatus,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn entries(&self) -> &[DriveEntry] {
        &self.entries
    }

    pub fn status(&self) -> &ListingStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == ListingStatus::Loading
    }

    /// Back to the root with nothing listed.
    pub fn reset(&mut self) {
        self.state = NavigationState::default();
        self.entries.clear();
        self.status = ListingStatus::Idle;
        // keep counting so in-flight listings from before the reset go stale
        self.generation += 1;
    }

    /// Re-lists the current folder.
    pub fn refresh(&mut self) -> ListingRequest {
        self.issue(self.state.path.clone())
    }

    pub fn enter_folder(&mut self, entry: &DriveEntry) -> Result<ListingRequest, DriveError> {
        if entry.kind != EntryKind::Folder {
            return Err(DriveError::NotAFolder(entry.name.clone()));
        }
        Ok(self.issue(self.state.entered(entry)))
    }

    pub fn jump_to_breadcrumb(&mut self, index: usize) -> Result<ListingRequest, DriveError> {
        let len = self.state.path.len();
        if index >= len {
            return Err(DriveError::BreadcrumbOutOfRange { index, len });
        }
        Ok(self.issue(self.state.path[..=index].to_vec()))
    }

    pub fn select_entry(&mut self, entry: &DriveEntry) -> Selection {
        match entry.kind {
            EntryKind::Folder => Selection::Navigate(self.issue(self.state.entered(entry))),
            EntryKind::Image => Selection::Picked(entry.clone()),
            EntryKind::Other => Selection::Ignored,
        }
    }

    /// Applies the result of `request` if it is still the latest one.
    pub fn complete(
        &mut self,
        request: ListingRequest,
        result: Result<Vec<DriveEntry>, DriveError>,
    ) -> Result<ListingOutcome, DriveError> {
        if request.generation != self.generation {
            log::debug!(
                "Dropping stale listing of {} (generation {}, latest {})",
                request.folder_id,
                request.generation,
                self.generation
            );
            return Ok(ListingOutcome::Stale);
        }

        match result {
            Ok(entries) => {
                self.state = NavigationState { path: request.path };
                self.entries = entries;
                self.status = ListingStatus::Idle;
                Ok(ListingOutcome::Applied)
            }
            Err(e) => {
                self.status = ListingStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Runs `request` against `lister` and applies it.
    pub async fn load<L>(
        &mut self,
        lister: &L,
        request: ListingRequest,
    ) -> Result<ListingOutcome, DriveError>
    where
        L: FolderLister + ?Sized,
    {
        let result = lister.list_children(&request.folder_id).await;
        self.complete(request, result)
    }

    fn issue(&mut self, path: Vec<Breadcrumb>) -> ListingRequest {
        self.generation += 1;
        self.status = ListingStatus::Loading;
        let folder_id = path
            .last()
            .map(|crumb| crumb.id.clone())
            .unwrap_or_else(|| ROOT_FOLDER_ID.to_string());
        ListingRequest {
            generation: self.generation,
            folder_id,
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::entry::FOLDER_MIME_TYPE;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn folder(id: &str, name: &str) -> DriveEntry {
        DriveEntry::new(id, name, FOLDER_MIME_TYPE)
    }

    fn image(id: &str, name: &str) -> DriveEntry {
        DriveEntry::new(id, name, "image/png")
    }

    fn assert_invariant(nav: &Navigator) {
        let crumbs = nav.state().breadcrumbs();
        assert!(!crumbs.is_empty());
        assert_eq!(crumbs[0].id, ROOT_FOLDER_ID);
        assert_eq!(crumbs.last().unwrap().id, nav.state().current_folder_id());
    }

    struct FakeDrive(HashMap<String, Vec<DriveEntry>>);

    #[async_trait]
    impl FolderLister for FakeDrive {
        async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>, DriveError> {
            self.0
                .get(folder_id)
                .cloned()
                .ok_or(DriveError::DirectoryFetch { status: 404 })
        }
    }

    fn fake_drive() -> FakeDrive {
        let mut tree = HashMap::new();
        tree.insert("root".to_string(), vec![folder("a", "Albums"), image("p", "pic.png")]);
        tree.insert("a".to_string(), vec![folder("b", "2024")]);
        tree.insert("b".to_string(), vec![image("q", "sunset.png")]);
        FakeDrive(tree)
    }

    #[test]
    fn test_starts_at_root() {
        let nav = Navigator::new();
        assert_eq!(nav.state().current_folder_id(), "root");
        assert_eq!(nav.state().breadcrumbs().len(), 1);
        assert_invariant(&nav);
    }

    #[tokio::test]
    async fn test_enter_and_jump_keep_invariant() {
        let drive = fake_drive();
        let mut nav = Navigator::new();

        let request = nav.refresh();
        nav.load(&drive, request).await.unwrap();
        assert_eq!(nav.entries().len(), 2);

        let request = nav.enter_folder(&folder("a", "Albums")).unwrap();
        nav.load(&drive, request).await.unwrap();
        let request = nav.enter_folder(&folder("b", "2024")).unwrap();
        nav.load(&drive, request).await.unwrap();
        assert_invariant(&nav);
        let names: Vec<_> = nav.state().breadcrumbs().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["My Drive", "Albums", "2024"]);
        assert_eq!(nav.entries()[0].name, "sunset.png");

        let request = nav.jump_to_breadcrumb(1).unwrap();
        nav.load(&drive, request).await.unwrap();
        assert_invariant(&nav);
        assert_eq!(nav.state().current_folder_id(), "a");
        assert_eq!(nav.state().breadcrumbs().len(), 2);

        let request = nav.jump_to_breadcrumb(0).unwrap();
        nav.load(&drive, request).await.unwrap();
        assert_invariant(&nav);
        assert_eq!(nav.state().breadcrumbs().len(), 1);
    }

    #[test]
    fn test_preconditions() {
        let mut nav = Navigator::new();
        assert!(matches!(
            nav.enter_folder(&image("p", "pic.png")),
            Err(DriveError::NotAFolder(_))
        ));
        assert!(matches!(
            nav.jump_to_breadcrumb(1),
            Err(DriveError::BreadcrumbOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_failed_listing_leaves_state_untouched() {
        let mut nav = Navigator::new();
        let request = nav.refresh();
        nav.complete(request, Ok(vec![folder("a", "Albums")])).unwrap();

        let request = nav.enter_folder(&folder("a", "Albums")).unwrap();
        assert!(nav.is_loading());
        // nothing applied before the listing resolves
        assert_eq!(nav.state().current_folder_id(), "root");

        let err = nav
            .complete(request, Err(DriveError::DirectoryFetch { status: 500 }))
            .unwrap_err();
        assert!(matches!(err, DriveError::DirectoryFetch { status: 500 }));
        assert_eq!(nav.state().current_folder_id(), "root");
        assert_eq!(nav.entries().len(), 1);
        assert!(matches!(nav.status(), ListingStatus::Failed(_)));
        assert_invariant(&nav);
    }

    #[test]
    fn test_stale_listing_is_discarded() {
        let mut nav = Navigator::new();
        let slow = nav.enter_folder(&folder("a", "Albums")).unwrap();
        let fast = nav.enter_folder(&folder("b", "Backups")).unwrap();

        let outcome = nav.complete(fast, Ok(vec![image("x", "x.png")])).unwrap();
        assert_eq!(outcome, ListingOutcome::Applied);

        let outcome = nav.complete(slow, Ok(vec![image("y", "y.png")])).unwrap();
        assert_eq!(outcome, ListingOutcome::Stale);
        assert_eq!(nav.state().current_folder_id(), "b");
        assert_eq!(nav.entries()[0].id, "x");
    }

    #[test]
    fn test_stale_listing_after_newer_failure_is_discarded() {
        let mut nav = Navigator::new();
        let old = nav.enter_folder(&folder("a", "Albums")).unwrap();
        let new = nav.enter_folder(&folder("b", "Backups")).unwrap();

        assert!(nav.complete(new, Err(DriveError::DirectoryFetch { status: 500 })).is_err());
        let outcome = nav.complete(old, Ok(vec![image("y", "y.png")])).unwrap();
        assert_eq!(outcome, ListingOutcome::Stale);
        assert_eq!(nav.state().current_folder_id(), "root");
        assert!(nav.entries().is_empty());
    }

    #[test]
    fn test_reset_makes_in_flight_listing_stale() {
        let mut nav = Navigator::new();
        let request = nav.enter_folder(&folder("a", "Albums")).unwrap();
        nav.reset();
        let outcome = nav.complete(request, Ok(vec![])).unwrap();
        assert_eq!(outcome, ListingOutcome::Stale);
        assert_eq!(nav.state().current_folder_id(), "root");
        assert_eq!(nav.status(), &ListingStatus::Idle);
    }

    #[test]
    fn test_select_entry() {
        let mut nav = Navigator::new();
        match nav.select_entry(&folder("a", "Albums")) {
            Selection::Navigate(request) => assert_eq!(request.folder_id, "a"),
            other => panic!("unexpected {:?}", other),
        }
        match nav.select_entry(&image("p", "pic.png")) {
            Selection::Picked(entry) => assert_eq!(entry.id, "p"),
            other => panic!("unexpected {:?}", other),
        }
        let doc = DriveEntry::new("d", "notes.txt", "text/plain");
        assert!(matches!(nav.select_entry(&doc), Selection::Ignored));
    }
}
