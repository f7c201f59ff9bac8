use crate::db::{Database, SqliteDatabase};
use crate::sync::config::SyncConfig;
use crate::sync::git::{CommitIdentity, GitError, MockGitOps, RealGit};
use crate::sync::publisher::*;
use mockall::predicate::*;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};
use tempfile::TempDir;

const REMOTE: &str = "https://example.com/me/routines-data.git";

fn mock_output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

fn ok(stdout: &str) -> Result<Output, GitError> {
    Ok(mock_output(0, stdout, ""))
}

fn rejected() -> Result<Output, GitError> {
    Err(GitError::NonZeroExit {
        code: 1,
        output: "! [rejected] HEAD -> main (fetch first)".to_string(),
    })
}

async fn setup_test_db() -> SqliteDatabase {
    let db = SqliteDatabase::in_memory().await.unwrap();
    db.migrate().await;
    db
}

/// Working copy that already has a `.git` directory, so no init is expected.
fn initialized_dir() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
    temp_dir
}

fn config(temp_dir: &TempDir) -> SyncConfig {
    SyncConfig::default().with_work_dir(temp_dir.path())
}

/// Expectations shared by every publish that reaches the staging step.
fn expect_stage(mock: &mut MockGitOps, porcelain: &'static str) {
    mock.expect_set_config()
        .with(always(), eq("user.name"), eq("Routines Sync"))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_set_config()
        .with(always(), eq("user.email"), eq("sync@routines.local"))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_add_files().times(1).returning(|_, _| ok(""));
    mock.expect_status_porcelain()
        .times(1)
        .returning(move |_| ok(porcelain));
}

fn staged(paths: &[&str]) -> Option<Vec<String>> {
    Some(paths.iter().map(|p| p.to_string()).collect())
}

#[test]
fn test_has_staged_changes() {
    assert!(!has_staged_changes(""));
    assert!(!has_staged_changes("?? data.db\n"));
    assert!(!has_staged_changes(" M snapshots/users.json\n"));
    assert!(!has_staged_changes("!! target/\n"));
    assert!(has_staged_changes("M  snapshots/users.json\n"));
    assert!(has_staged_changes("?? data.db\nA  snapshots/plays.json\n"));
    assert!(has_staged_changes("D  static/videos/old.mp4\n"));
    assert!(has_staged_changes("R  a.json -> b.json\n"));
    assert!(has_staged_changes("MM snapshots/users.json\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_disabled_touches_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let db = setup_test_db().await;
    let sync = RepositorySync::new(MockGitOps::new(), config(&temp_dir).with_enabled(false));

    let report = sync.publish_report(&db, None, None, true).await;

    assert_eq!(report.outcome, PublishOutcome::Disabled);
    assert!(!report.success());
    assert!(!temp_dir.path().join("snapshots").exists());
    assert!(!sync.publish(&db, None, None, true).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initializes_missing_repository_and_adds_remote() {
    let temp_dir = TempDir::new().unwrap();
    let work_dir = temp_dir.path().to_path_buf();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_init()
        .with(eq(work_dir.clone()))
        .times(1)
        .returning(|_| ok("Initialized empty Git repository"));
    mock.expect_remote_get_url()
        .with(eq(work_dir.clone()), eq("origin"))
        .times(1)
        .returning(|_, _| {
            Err(GitError::NonZeroExit {
                code: 2,
                output: "error: No such remote 'origin'".to_string(),
            })
        });
    mock.expect_add_remote()
        .with(eq(work_dir.clone()), eq("origin"), eq(REMOTE))
        .times(1)
        .returning(|_, _, _| ok(""));

    let sync = RepositorySync::new(mock, config(&temp_dir).with_remote_url(REMOTE));
    let report = sync.publish_report(&db, staged(&[]), None, false).await;

    assert_eq!(report.outcome, PublishOutcome::NothingToPublish);
    assert!(report.success());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_changed_remote_url_is_updated() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_remote_get_url()
        .times(1)
        .returning(|_, _| ok("https://old.example.com/data.git\n"));
    mock.expect_set_remote_url()
        .with(always(), eq("origin"), eq(REMOTE))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_add_remote().never();

    let sync = RepositorySync::new(mock, config(&temp_dir).with_remote_url(REMOTE));
    sync.publish(&db, staged(&[]), None, false).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_staged_changes_means_no_commit() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    expect_stage(&mut mock, "?? data.db\n");
    mock.expect_commit().never();
    mock.expect_push_upstream().never();

    let sync = RepositorySync::new(mock, config(&temp_dir));
    let report = sync.publish_report(&db, None, Some("revisit alice/US"), false).await;

    assert_eq!(report.outcome, PublishOutcome::NoChanges);
    assert!(report.success());
    assert!(!report.committed);
    assert_eq!(report.paths.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_failure_is_a_failure() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_set_config().times(2).returning(|_, _, _| ok(""));
    mock.expect_add_files().times(1).returning(|_, _| ok(""));
    mock.expect_status_porcelain()
        .times(1)
        .returning(|_| Err(GitError::Timeout(std::time::Duration::from_secs(15))));
    mock.expect_commit().never();

    let sync = RepositorySync::new(mock, config(&temp_dir));

    assert!(!sync.publish(&db, None, None, false).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_commit_without_remote_stays_local() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    expect_stage(&mut mock, "A  snapshots/users.json\n");
    mock.expect_commit()
        .with(always(), eq("register alice/US"), eq(None::<CommitIdentity>))
        .times(1)
        .returning(|_, _, _| ok("[main (root-commit) 1a2b3c4] register alice/US"));
    mock.expect_last_commit()
        .times(1)
        .returning(|_| ok("1a2b3c4 register alice/US"));
    mock.expect_remote_get_url()
        .times(1)
        .returning(|_, _| Err(GitError::NonZeroExit {
            code: 2,
            output: "error: No such remote 'origin'".to_string(),
        }));
    mock.expect_push_upstream().never();

    let sync = RepositorySync::new(mock, config(&temp_dir));
    let report = sync
        .publish_report(&db, None, Some("register alice/US"), false)
        .await;

    assert_eq!(report.outcome, PublishOutcome::NoRemote);
    assert!(!report.success());
    assert!(report.committed);
    assert_eq!(report.last_commit.as_deref(), Some("1a2b3c4 register alice/US"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_with_upstream() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    // reconcile, then the pre-push remote check
    mock.expect_remote_get_url()
        .times(2)
        .returning(|_, _| ok(&format!("{}\n", REMOTE)));
    mock.expect_set_remote_url().never();
    expect_stage(&mut mock, "M  snapshots/users.json\n");
    mock.expect_commit().times(1).returning(|_, _, _| ok(""));
    mock.expect_last_commit().returning(|_| ok("abc1234 msg"));
    mock.expect_push_upstream()
        .with(always(), eq("origin"), eq("main"))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_push().never();

    let sync = RepositorySync::new(mock, config(&temp_dir).with_remote_url(REMOTE));
    let report = sync.publish_report(&db, None, None, false).await;

    assert_eq!(report.outcome, PublishOutcome::Pushed);
    assert!(report.pushed);
    assert_eq!(report.remote.as_deref(), Some(REMOTE));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_falls_back_to_plain_push() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_remote_get_url()
        .returning(|_, _| ok(&format!("{}\n", REMOTE)));
    expect_stage(&mut mock, "M  snapshots/users.json\n");
    mock.expect_commit().times(1).returning(|_, _, _| ok(""));
    mock.expect_last_commit().returning(|_| ok("abc1234 msg"));
    mock.expect_push_upstream()
        .times(1)
        .returning(|_, _, _| rejected());
    mock.expect_push().times(1).returning(|_| ok(""));

    let sync = RepositorySync::new(mock, config(&temp_dir).with_remote_url(REMOTE));

    assert!(sync.publish(&db, None, None, false).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_failure_is_reported() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_remote_get_url()
        .returning(|_, _| ok(&format!("{}\n", REMOTE)));
    expect_stage(&mut mock, "M  snapshots/users.json\n");
    mock.expect_commit().times(1).returning(|_, _, _| ok(""));
    mock.expect_last_commit().returning(|_| ok("abc1234 msg"));
    mock.expect_push_upstream()
        .times(1)
        .returning(|_, _, _| rejected());
    mock.expect_push()
        .times(1)
        .returning(|_| Err(GitError::Timeout(std::time::Duration::from_secs(30))));

    let sync = RepositorySync::new(mock, config(&temp_dir).with_remote_url(REMOTE));
    let report = sync.publish_report(&db, None, None, false).await;

    assert_eq!(report.outcome, PublishOutcome::PushFailed);
    assert!(report.committed);
    assert!(!report.pushed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_commit_failure_still_pushes() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_remote_get_url()
        .returning(|_, _| ok(&format!("{}\n", REMOTE)));
    expect_stage(&mut mock, "M  snapshots/users.json\n");
    mock.expect_commit().times(1).returning(|_, _, _| {
        Err(GitError::NonZeroExit {
            code: 128,
            output: "fatal: unable to auto-detect email address".to_string(),
        })
    });
    mock.expect_last_commit().never();
    mock.expect_push_upstream()
        .times(1)
        .returning(|_, _, _| ok(""));

    let sync = RepositorySync::new(mock, config(&temp_dir).with_remote_url(REMOTE));
    let report = sync.publish_report(&db, None, None, false).await;

    assert!(!report.committed);
    assert_eq!(report.outcome, PublishOutcome::Pushed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_configured_author_overrides_commit_identity() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;
    let identity = CommitIdentity {
        name: "Ops".to_string(),
        email: "ops@example.com".to_string(),
    };

    let mut mock = MockGitOps::new();
    mock.expect_set_config()
        .with(always(), eq("user.name"), eq("Ops"))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_set_config()
        .with(always(), eq("user.email"), eq("ops@example.com"))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_add_files().returning(|_, _| ok(""));
    mock.expect_status_porcelain()
        .returning(|_| ok("M  snapshots/users.json\n"));
    mock.expect_commit()
        .with(always(), always(), eq(Some(identity)))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_last_commit().returning(|_| ok("abc1234 msg"));
    mock.expect_remote_get_url()
        .returning(|_, _| Err(GitError::GitNotFound));

    let sync = RepositorySync::new(
        mock,
        config(&temp_dir).with_author("Ops", "ops@example.com"),
    );
    sync.publish(&db, None, None, false).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_default_message_is_timestamped() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    expect_stage(&mut mock, "M  snapshots/users.json\n");
    mock.expect_commit()
        .withf(|_, message, _| message.starts_with("Snapshot ") && message.ends_with('Z'))
        .times(1)
        .returning(|_, _, _| ok(""));
    mock.expect_last_commit().returning(|_| ok("abc1234 msg"));
    mock.expect_remote_get_url()
        .returning(|_, _| Err(GitError::GitNotFound));

    let sync = RepositorySync::new(mock, config(&temp_dir));
    sync.publish(&db, None, None, false).await;
}

/// Paths handed to `git add` for a given flag combination.
async fn staged_paths(commit_media: bool, include_assets: bool) -> Vec<String> {
    let temp_dir = initialized_dir();
    std::fs::create_dir_all(temp_dir.path().join("static/videos")).unwrap();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_set_config().returning(|_, _, _| ok(""));
    mock.expect_add_files().times(1).returning(|_, _| ok(""));
    mock.expect_status_porcelain().returning(|_| ok(""));

    let sync = RepositorySync::new(mock, config(&temp_dir).with_commit_media(commit_media));
    sync.publish_report(&db, staged(&["snapshots/users.json"]), None, include_assets)
        .await
        .paths
}

#[tokio::test(flavor = "multi_thread")]
async fn test_media_staged_only_when_both_flags_set() {
    let media = "static/videos".to_string();

    assert!(staged_paths(true, true).await.contains(&media));
    assert!(!staged_paths(true, false).await.contains(&media));
    assert!(!staged_paths(false, true).await.contains(&media));
    assert!(!staged_paths(false, false).await.contains(&media));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_media_dir_is_not_staged() {
    let temp_dir = initialized_dir();
    let db = setup_test_db().await;

    let mut mock = MockGitOps::new();
    mock.expect_set_config().returning(|_, _, _| ok(""));
    mock.expect_add_files()
        .withf(|_, files| files.len() == 1 && files[0] == "snapshots/users.json")
        .times(1)
        .returning(|_, _| ok(""));
    mock.expect_status_porcelain().returning(|_| ok(""));

    let sync = RepositorySync::new(mock, config(&temp_dir).with_commit_media(true));
    let report = sync
        .publish_report(&db, staged(&["snapshots/users.json"]), None, true)
        .await;

    assert_eq!(report.paths, vec!["snapshots/users.json".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_of_uninitialized_copy() {
    let temp_dir = TempDir::new().unwrap();
    let sync = RepositorySync::new(MockGitOps::new(), config(&temp_dir));

    let status = sync.status().await;

    assert!(status.enabled);
    assert!(!status.initialized);
    assert_eq!(status.clean, None);
    assert_eq!(status.remote_url, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_of_initialized_copy() {
    let temp_dir = initialized_dir();

    let mut mock = MockGitOps::new();
    mock.expect_remote_get_url()
        .returning(|_, _| ok(&format!("{}\n", REMOTE)));
    mock.expect_status_porcelain().returning(|_| ok(" M snapshots/users.json\n"));
    mock.expect_last_commit().returning(|_| ok("abc1234 register alice/US"));

    let sync = RepositorySync::new(mock, config(&temp_dir));
    let status = sync.status().await;

    assert!(status.initialized);
    assert_eq!(status.remote_url.as_deref(), Some(REMOTE));
    assert_eq!(status.clean, Some(false));
    assert_eq!(status.last_commit.as_deref(), Some("abc1234 register alice/US"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_git_binary_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let db = setup_test_db().await;
    let git = RealGit::new().with_binary("/nonexistent/bin/git");

    let sync = RepositorySync::new(git, config(&temp_dir).with_remote_url(REMOTE));
    let report = sync
        .publish_report(&db, None, Some("register alice/US"), false)
        .await;

    assert_eq!(report.outcome, PublishOutcome::StatusFailed);
    assert!(!report.success());
    // the export itself still happened
    assert!(temp_dir.path().join("snapshots/users.json").exists());

    let status = sync.status().await;
    assert!(!status.initialized);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_publishes_do_not_interleave() {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    let temp_dir = initialized_dir();
    let db = Arc::new(setup_test_db().await);
    let events = Arc::new(Mutex::new(Vec::new()));

    let mut mock = MockGitOps::new();
    mock.expect_set_config().returning(|_, _, _| ok(""));
    let recorded = Arc::clone(&events);
    mock.expect_add_files().times(2).returning(move |_, _| {
        recorded.lock().unwrap().push("add started");
        std::thread::sleep(Duration::from_millis(100));
        recorded.lock().unwrap().push("add finished");
        ok("")
    });
    mock.expect_status_porcelain().times(2).returning(|_| ok(""));

    let sync = Arc::new(RepositorySync::new(mock, config(&temp_dir)));
    let tasks: Vec<_> = (0..2)
        .map(|i| {
            let sync = Arc::clone(&sync);
            let db = Arc::clone(&db);
            tokio::spawn(async move {
                let message = format!("visit user{}/US", i);
                sync.publish_report(
                    db.as_ref(),
                    staged(&["snapshots/users.json"]),
                    Some(&message),
                    false,
                )
                .await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().outcome, PublishOutcome::NoChanges);
    }

    assert_eq!(
        *events.lock().unwrap(),
        vec!["add started", "add finished", "add started", "add finished"]
    );
}

#[cfg(feature = "git-tests")]
mod real_git {
    use super::*;
    use crate::db::{Registration, UserRepository};
    use crate::sync::json::read_json_array;
    use std::path::Path;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {:?} failed", args);
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn commit_count(dir: &Path) -> usize {
        git(dir, &["rev-list", "--count", "HEAD"]).parse().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_twice_mirrors_two_commits() {
        let remote_dir = TempDir::new().unwrap();
        git(remote_dir.path(), &["init", "--bare"]);
        let remote_url = remote_dir.path().to_string_lossy().into_owned();

        let work_dir = TempDir::new().unwrap();
        let db = setup_test_db().await;
        let sync = RepositorySync::new(
            RealGit::new(),
            config(&work_dir).with_remote_url(remote_url),
        );
        let alice = Registration {
            username: "alice".to_string(),
            country: "US".to_string(),
            age: 30,
            occupation: "engineer".to_string(),
        };

        db.users().register(&alice).await.unwrap();
        let first = sync
            .publish_report(&db, None, Some("register alice/US"), false)
            .await;
        assert_eq!(first.outcome, PublishOutcome::Pushed, "{:?}", first);

        let users: Vec<serde_json::Value> = read_json_array(
            &work_dir.path().join("snapshots/users.json"),
        )
        .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["visits"], 1);
        assert_eq!(commit_count(work_dir.path()), 1);

        // nothing changed: no new commit
        assert!(sync.publish(&db, None, Some("noop"), false).await);
        assert_eq!(commit_count(work_dir.path()), 1);

        db.users().register(&alice).await.unwrap();
        assert!(sync.publish(&db, None, Some("revisit alice/US"), false).await);
        assert_eq!(commit_count(work_dir.path()), 2);

        let users: Vec<serde_json::Value> = read_json_array(
            &work_dir.path().join("snapshots/users.json"),
        )
        .unwrap();
        assert_eq!(users[0]["visits"], 2);

        // the bare remote received both commits on the configured branch
        assert_eq!(
            git(remote_dir.path(), &["rev-list", "--count", "main"]),
            "2"
        );
    }
}
