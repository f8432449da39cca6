use super::{LifecycleUpdate, Store, StoreError, StoredUpload};
use crate::classify::FileType;
use crate::project::{
    FileId, Issue, IssueId, IssueKind, Project, ProjectId, ProjectStatus, SourceFile,
};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const STORE_FILE: &str = "store.json";
const STORE_FORMAT_VERSION: u32 = 1;
const STORE_LOCK_TIMEOUT_SECS: u64 = 5;
const STORE_LOCK_RETRY_MS: u64 = 50;

/// Files and issues sit behind `Arc` so the rollback snapshot taken by
/// [`LocalStore::mutate`] only copies pointers; a step clones just the
/// records it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    version: u32,
    projects: Vec<Project>,
    files: Vec<Arc<SourceFile>>,
    issues: Vec<Arc<Issue>>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            projects: Vec::new(),
            files: Vec::new(),
            issues: Vec::new(),
        }
    }
}

impl StoreState {
    fn project_mut(&mut self, id: ProjectId) -> Result<&mut Project, StoreError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::ProjectNotFound(id))
    }

    fn ensure_project(&self, id: ProjectId) -> Result<(), StoreError> {
        if self.projects.iter().any(|p| p.id == id) {
            Ok(())
        } else {
            Err(StoreError::ProjectNotFound(id))
        }
    }

    fn file_count(&self, project_id: ProjectId) -> usize {
        self.files
            .iter()
            .filter(|f| f.project_id == project_id)
            .count()
    }

    fn ensure_name_free(&self, file: &SourceFile) -> Result<(), StoreError> {
        let taken = self
            .files
            .iter()
            .any(|f| f.project_id == file.project_id && f.name == file.name);
        if taken {
            return Err(StoreError::DuplicateFile(file.name.clone()));
        }
        Ok(())
    }

    fn issue_mut(&mut self, id: IssueId) -> Result<&mut Issue, StoreError> {
        self.issues
            .iter_mut()
            .find(|i| i.id == id)
            .map(Arc::make_mut)
            .ok_or(StoreError::IssueNotFound(id))
    }
}

/// In-memory store, optionally mirrored to `<dir>/store.json`.
///
/// Each mutation runs against the live state and is persisted before the
/// lock is released; if the closure or the write fails the previous state is
/// put back, so a failed step leaves nothing behind.
pub struct LocalStore {
    state: Mutex<StoreState>,
    dir: Option<PathBuf>,
}

struct StoreLock {
    file: fs::File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            dir: None,
        }
    }

    /// Open (or create) a store persisted under `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let state = {
            let _lock = lock_dir(dir, false)?;
            load_snapshot(&dir.join(STORE_FILE))?
        };
        tracing::debug!(
            dir = %dir.display(),
            projects = state.projects.len(),
            "opened store"
        );
        Ok(Self {
            state: Mutex::new(state),
            dir: Some(dir.to_path_buf()),
        })
    }

    pub fn location(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn read(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.read();
        let snapshot = state.clone();

        let value = match apply(&mut state) {
            Ok(value) => value,
            Err(err) => {
                *state = snapshot;
                return Err(err);
            }
        };

        if let Some(dir) = &self.dir {
            if let Err(err) = persist(dir, &state) {
                tracing::error!(dir = %dir.display(), "store write failed, rolling back: {}", err);
                *state = snapshot;
                return Err(err);
            }
        }
        Ok(value)
    }
}

fn lock_dir(dir: &Path, exclusive: bool) -> Result<StoreLock, StoreError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.join(".lock"))?;

    let start = Instant::now();
    loop {
        let result = if exclusive {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        match result {
            Ok(()) => return Ok(StoreLock { file }),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() >= Duration::from_secs(STORE_LOCK_TIMEOUT_SECS) {
                    return Err(StoreError::LockTimeout(STORE_LOCK_TIMEOUT_SECS));
                }
                std::thread::sleep(Duration::from_millis(STORE_LOCK_RETRY_MS));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn load_snapshot(path: &Path) -> Result<StoreState, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StoreState::default()),
        Err(err) => return Err(err.into()),
    };
    let state: StoreState = serde_json::from_str(&content)?;
    if state.version != STORE_FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion(state.version));
    }
    Ok(state)
}

fn persist(dir: &Path, state: &StoreState) -> Result<(), StoreError> {
    let _lock = lock_dir(dir, true)?;
    let content = serde_json::to_string(state)?;
    write_atomic(&dir.join(STORE_FILE), &content)
}

/// Write to a temp file and rename over the target.
fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}

impl Store for LocalStore {
    fn create_project(&self, total_files: usize) -> Result<Project, StoreError> {
        self.mutate(|state| {
            let project = Project::new(total_files);
            state.projects.push(project.clone());
            Ok(project)
        })
    }

    fn project(&self, id: ProjectId) -> Result<Project, StoreError> {
        self.read()
            .projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::ProjectNotFound(id))
    }

    fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.read().projects.clone())
    }

    fn update_lifecycle(
        &self,
        id: ProjectId,
        update: LifecycleUpdate,
    ) -> Result<Project, StoreError> {
        self.mutate(|state| {
            let project = state.project_mut(id)?;
            match update {
                LifecycleUpdate::BeginProcessing => project.begin_processing()?,
                LifecycleUpdate::Complete => project.complete()?,
                LifecycleUpdate::Fail(message) => project.fail(message)?,
            }
            Ok(project.clone())
        })
    }

    fn add_file(&self, file: SourceFile) -> Result<SourceFile, StoreError> {
        self.mutate(|state| {
            state.ensure_project(file.project_id)?;
            state.ensure_name_free(&file)?;
            state.files.push(Arc::new(file.clone()));
            Ok(file)
        })
    }

    fn accept_upload(&self, file: SourceFile) -> Result<StoredUpload, StoreError> {
        self.mutate(|state| {
            let project_id = file.project_id;
            let project = state.project_mut(project_id)?;
            if !matches!(
                project.status,
                ProjectStatus::Initializing | ProjectStatus::Processing
            ) {
                return Err(StoreError::NotAccepting(project.status));
            }
            let total_files = project.total_files;

            state.ensure_name_free(&file)?;
            let existing = state.file_count(project_id);
            if existing >= total_files {
                return Err(StoreError::FileLimitReached(total_files));
            }

            let project = state.project_mut(project_id)?;
            if project.status == ProjectStatus::Initializing {
                project.begin_processing()?;
            }
            let file_id = file.id;
            state.files.push(Arc::new(file));
            Ok(StoredUpload {
                file_id,
                files_uploaded: existing + 1,
                total_files,
            })
        })
    }

    fn files(&self, project_id: ProjectId) -> Result<Vec<SourceFile>, StoreError> {
        let state = self.read();
        state.ensure_project(project_id)?;
        Ok(state
            .files
            .iter()
            .filter(|f| f.project_id == project_id)
            .map(|f| SourceFile::clone(f))
            .collect())
    }

    fn issues(
        &self,
        project_id: ProjectId,
        kind: Option<IssueKind>,
    ) -> Result<Vec<Issue>, StoreError> {
        let state = self.read();
        state.ensure_project(project_id)?;
        Ok(state
            .issues
            .iter()
            .filter(|i| i.project_id == project_id)
            .filter(|i| kind.is_none_or(|k| i.kind == k))
            .map(|i| Issue::clone(i))
            .collect())
    }

    fn commit_extraction(
        &self,
        file_id: FileId,
        file_type: FileType,
        issues: Vec<Issue>,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            let file = state
                .files
                .iter_mut()
                .find(|f| f.id == file_id)
                .map(Arc::make_mut)
                .ok_or(StoreError::FileNotFound(file_id))?;
            file.file_type = Some(file_type);
            file.processed = true;
            state.issues.extend(issues.into_iter().map(Arc::new));
            Ok(())
        })
    }

    fn commit_correlation(
        &self,
        project_id: ProjectId,
        confirmed: Vec<Issue>,
        back_refs: Vec<(IssueId, IssueId)>,
    ) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.ensure_project(project_id)?;
            state.issues.extend(confirmed.into_iter().map(Arc::new));
            for (source_id, confirmed_id) in back_refs {
                state
                    .issue_mut(source_id)?
                    .correlation
                    .attach_back_ref(confirmed_id);
            }
            Ok(())
        })
    }

    fn commit_fix_suggestions(
        &self,
        project_id: ProjectId,
        suggestions: Vec<(IssueId, String)>,
    ) -> Result<usize, StoreError> {
        self.mutate(|state| {
            state.ensure_project(project_id)?;
            let mut applied = 0;
            for (issue_id, text) in suggestions {
                let issue = state.issue_mut(issue_id)?;
                if issue.fix_suggestion.is_none() {
                    issue.fix_suggestion = Some(text);
                    applied += 1;
                }
            }
            Ok(applied)
        })
    }

    fn increment_files_processed(&self, project_id: ProjectId) -> Result<Project, StoreError> {
        self.mutate(|state| {
            let project = state.project_mut(project_id)?;
            project.record_file_processed();
            Ok(project.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{CorrelationData, ProjectStatus, Severity};
    use chrono::Utc;
    use uuid::Uuid;

    fn potential(project_id: ProjectId, file_id: FileId, title: &str) -> Issue {
        Issue {
            id: Uuid::new_v4(),
            project_id,
            file_id: Some(file_id),
            kind: IssueKind::Potential,
            title: title.to_string(),
            description: String::new(),
            line_number: None,
            code_snippet: String::new(),
            severity: Severity::Medium,
            category: "database".to_string(),
            fix_suggestion: None,
            correlation: CorrelationData::Potential {
                keywords: vec!["pool".to_string()],
                confidence: 0.5,
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_file_names_rejected_per_project() {
        let store = LocalStore::in_memory();
        let a = store.create_project(2).unwrap();
        let b = store.create_project(2).unwrap();

        store
            .add_file(SourceFile::new(a.id, "x.py".into(), "x".into()))
            .unwrap();
        let err = store
            .add_file(SourceFile::new(a.id, "x.py".into(), "y".into()))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFile(_)));
        // Same name in another project is fine
        store
            .add_file(SourceFile::new(b.id, "x.py".into(), "x".into()))
            .unwrap();
        assert_eq!(store.files(a.id).unwrap().len(), 1);
    }

    #[test]
    fn test_accept_upload_enforces_declared_count() {
        let store = LocalStore::in_memory();
        let project = store.create_project(2).unwrap();

        let first = store
            .accept_upload(SourceFile::new(project.id, "a.py".into(), "a".into()))
            .unwrap();
        assert_eq!(first.files_uploaded, 1);
        assert_eq!(first.total_files, 2);
        assert_eq!(
            store.project(project.id).unwrap().status,
            ProjectStatus::Processing
        );

        let err = store
            .accept_upload(SourceFile::new(project.id, "a.py".into(), "again".into()))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFile(_)));

        let second = store
            .accept_upload(SourceFile::new(project.id, "b.py".into(), "b".into()))
            .unwrap();
        assert_eq!(second.files_uploaded, 2);

        let err = store
            .accept_upload(SourceFile::new(project.id, "c.py".into(), "c".into()))
            .unwrap_err();
        assert!(matches!(err, StoreError::FileLimitReached(2)));
        assert_eq!(store.files(project.id).unwrap().len(), 2);
    }

    #[test]
    fn test_accept_upload_refuses_terminal_project() {
        let store = LocalStore::in_memory();
        let project = store.create_project(1).unwrap();
        store
            .update_lifecycle(project.id, LifecycleUpdate::Fail("down".into()))
            .unwrap();
        let err = store
            .accept_upload(SourceFile::new(project.id, "a.py".into(), "a".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotAccepting(ProjectStatus::Failed)
        ));
        assert!(store.files(project.id).unwrap().is_empty());
    }

    #[test]
    fn test_steps_share_untouched_records() {
        let store = LocalStore::in_memory();
        let project = store.create_project(2).unwrap();
        let a = store
            .add_file(SourceFile::new(project.id, "a.py".into(), "a".repeat(4096)))
            .unwrap();
        store
            .add_file(SourceFile::new(project.id, "b.py".into(), "b".repeat(4096)))
            .unwrap();
        let untouched = Arc::clone(&store.read().files[1]);

        store
            .commit_extraction(a.id, FileType::Python, Vec::new())
            .unwrap();
        store.increment_files_processed(project.id).unwrap();

        let state = store.read();
        assert!(Arc::ptr_eq(&state.files[1], &untouched));
        // The rollback snapshot is gone once the step commits.
        assert_eq!(Arc::strong_count(&untouched), 2);
        assert!(state.files[0].processed);
    }

    #[test]
    fn test_invalid_transition_leaves_state_untouched() {
        let store = LocalStore::in_memory();
        let project = store.create_project(1).unwrap();
        let err = store
            .update_lifecycle(project.id, LifecycleUpdate::Complete)
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        assert_eq!(
            store.project(project.id).unwrap().status,
            ProjectStatus::Initializing
        );
    }

    #[test]
    fn test_commit_correlation_is_all_or_nothing() {
        let store = LocalStore::in_memory();
        let project = store.create_project(1).unwrap();
        let file = store
            .add_file(SourceFile::new(project.id, "a.py".into(), "a".into()))
            .unwrap();
        let source = potential(project.id, file.id, "slow query");
        let source_id = source.id;
        store
            .commit_extraction(file.id, FileType::Python, vec![source])
            .unwrap();

        let confirmed_id = Uuid::new_v4();
        let err = store
            .commit_correlation(
                project.id,
                vec![potential(project.id, file.id, "bogus")],
                vec![(source_id, confirmed_id), (Uuid::new_v4(), confirmed_id)],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::IssueNotFound(_)));

        let issues = store.issues(project.id, None).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].correlation.confirmed_issue_ids().is_empty());
    }

    #[test]
    fn test_fix_suggestions_never_overwrite() {
        let store = LocalStore::in_memory();
        let project = store.create_project(1).unwrap();
        let file = store
            .add_file(SourceFile::new(project.id, "a.py".into(), "a".into()))
            .unwrap();
        let issue = potential(project.id, file.id, "slow query");
        let id = issue.id;
        store
            .commit_extraction(file.id, FileType::Python, vec![issue])
            .unwrap();

        assert_eq!(
            store
                .commit_fix_suggestions(project.id, vec![(id, "first".into())])
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .commit_fix_suggestions(project.id, vec![(id, "second".into())])
                .unwrap(),
            0
        );
        let issues = store.issues(project.id, None).unwrap();
        assert_eq!(issues[0].fix_suggestion.as_deref(), Some("first"));
    }

    #[test]
    fn test_files_processed_saturates() {
        let store = LocalStore::in_memory();
        let project = store.create_project(1).unwrap();
        store.increment_files_processed(project.id).unwrap();
        let after = store.increment_files_processed(project.id).unwrap();
        assert_eq!(after.files_processed, 1);
    }

    #[test]
    fn test_issue_kind_filter() {
        let store = LocalStore::in_memory();
        let project = store.create_project(1).unwrap();
        let file = store
            .add_file(SourceFile::new(project.id, "a.py".into(), "a".into()))
            .unwrap();
        store
            .commit_extraction(
                file.id,
                FileType::Python,
                vec![potential(project.id, file.id, "one")],
            )
            .unwrap();
        assert_eq!(
            store
                .issues(project.id, Some(IssueKind::Confirmed))
                .unwrap()
                .len(),
            0
        );
        assert_eq!(
            store
                .issues(project.id, Some(IssueKind::Potential))
                .unwrap()
                .len(),
            1
        );
        let files = store.files(project.id).unwrap();
        assert!(files[0].processed);
        assert_eq!(files[0].file_type, Some(FileType::Python));
    }

    #[test]
    fn test_persistent_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let project_id = {
            let store = LocalStore::open(dir.path()).unwrap();
            let project = store.create_project(3).unwrap();
            store
                .add_file(SourceFile::new(project.id, "plan.jmx".into(), "<x/>".into()))
                .unwrap();
            project.id
        };

        let reopened = LocalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.project(project_id).unwrap().total_files, 3);
        assert_eq!(reopened.files(project_id).unwrap()[0].name, "plan.jmx");
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(STORE_FILE),
            r#"{"version": 99, "projects": [], "files": [], "issues": []}"#,
        )
        .unwrap();
        assert!(matches!(
            LocalStore::open(dir.path()),
            Err(StoreError::UnsupportedVersion(99))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_persist_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let project = store.create_project(1).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(dir.path().join("store.tmp")).unwrap();
        assert!(store.create_project(2).is_err());
        let projects = store.list_projects().unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, project.id);
    }
}
