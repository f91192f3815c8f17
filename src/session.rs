use crate::ai::{GeneratedTest, TestSummary};
use crate::github::{BranchRef, FileContent, FileRef, RepositoryRef, Session};

/// Selections made while walking through one generation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub repository: Option<RepositoryRef>,
    pub branch: Option<BranchRef>,
    pub files: Vec<FileRef>,
    pub file_contents: Vec<FileContent>,
    pub summaries: Vec<TestSummary>,
    pub selected_summary: Option<TestSummary>,
    pub generated_test: Option<GeneratedTest>,
}

/// Client-side state: who is signed in and what they have picked so far.
///
/// Owned by the top-level driver and passed down explicitly. Choosing an
/// earlier stage again clears everything that was derived from it.
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    auth: Option<Session>,
    selection: Selection,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&mut self, session: Session) {
        self.auth = Some(session);
        self.reset_selection();
    }

    #[allow(dead_code)] // The terminal driver holds one session for its whole run
    pub fn logout(&mut self) {
        self.auth = None;
        self.reset_selection();
    }

    #[allow(dead_code)] // The terminal driver keeps its own copy of the session
    pub fn auth(&self) -> Option<&Session> {
        self.auth.as_ref()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn reset_selection(&mut self) {
        self.selection = Selection::default();
    }

    /// Entering repository selection always starts a fresh cycle.
    pub fn enter_repository_selection(&mut self) {
        self.reset_selection();
    }

    pub fn select_repository(&mut self, repository: RepositoryRef) {
        self.reset_selection();
        self.selection.repository = Some(repository);
    }

    pub fn select_branch(&mut self, branch: BranchRef) {
        let selection = &mut self.selection;
        selection.branch = Some(branch);
        selection.files.clear();
        Self::clear_from_contents(selection);
    }

    pub fn select_files(&mut self, files: Vec<FileRef>) {
        self.selection.files = files;
        Self::clear_from_contents(&mut self.selection);
    }

    /// Replace the active content set; summaries and tests built on the old one are dropped.
    pub fn set_file_contents(&mut self, contents: Vec<FileContent>) {
        Self::clear_from_contents(&mut self.selection);
        self.selection.file_contents = contents;
    }

    pub fn set_summaries(&mut self, summaries: Vec<TestSummary>) {
        let selection = &mut self.selection;
        selection.summaries = summaries;
        selection.selected_summary = None;
        selection.generated_test = None;
    }

    pub fn select_summary(&mut self, summary: TestSummary) {
        self.selection.selected_summary = Some(summary);
        self.selection.generated_test = None;
    }

    pub fn set_generated_test(&mut self, generated: GeneratedTest) {
        self.selection.generated_test = Some(generated);
    }

    /// Source file a summary refers to: the tagged path if known, else the first file.
    pub fn original_file_for(&self, summary: &TestSummary) -> Option<&FileContent> {
        let contents = &self.selection.file_contents;
        summary
            .file
            .as_deref()
            .and_then(|path| contents.iter().find(|c| c.path() == path))
            .or_else(|| contents.first())
    }

    fn clear_from_contents(selection: &mut Selection) {
        selection.file_contents.clear();
        selection.summaries.clear();
        selection.selected_summary = None;
        selection.generated_test = None;
    }
}
