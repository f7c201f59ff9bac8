use crate::sync::git::*;
use mockall::predicate::*;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Output};
use tempfile::TempDir;

/// Helper to create a mock Output
fn mock_output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mock_git_init_failure() {
    let mut mock = MockGitOps::new();

    mock.expect_init()
        .with(eq(Path::new("/tmp/test")))
        .times(1)
        .returning(|_| Err(GitError::GitNotFound));

    let result = mock.init(Path::new("/tmp/test")).await;
    assert!(matches!(result.unwrap_err(), GitError::GitNotFound));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mock_commit_with_identity() {
    let mut mock = MockGitOps::new();
    let identity = CommitIdentity {
        name: "Ops".to_string(),
        email: "ops@example.com".to_string(),
    };

    mock.expect_commit()
        .with(
            eq(Path::new("/tmp/test")),
            eq("register alice/US"),
            eq(Some(identity.clone())),
        )
        .times(1)
        .returning(|_, _, _| Ok(mock_output(0, "[main abc1234] register alice/US\n", "")));

    let result = mock
        .commit(Path::new("/tmp/test"), "register alice/US", Some(identity))
        .await;
    assert!(result.unwrap().status.success());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mock_push_rejected() {
    let mut mock = MockGitOps::new();

    mock.expect_push_upstream()
        .with(eq(Path::new("/tmp/test")), eq("origin"), eq("main"))
        .times(1)
        .returning(|_, _, _| {
            Err(GitError::NonZeroExit {
                code: 1,
                output: "! [rejected] HEAD -> main (fetch first)\n".to_string(),
            })
        });

    let result = mock
        .push_upstream(Path::new("/tmp/test"), "origin", "main")
        .await;

    if let Err(GitError::NonZeroExit { code, output }) = result {
        assert_eq!(code, 1);
        assert!(output.contains("rejected"));
    } else {
        panic!("Expected NonZeroExit error");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_real_git_missing_binary_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let git = RealGit::new().with_binary("/nonexistent/bin/git");

    assert!(matches!(
        git.init(temp_dir.path()).await,
        Err(GitError::GitNotFound)
    ));
    assert!(matches!(
        git.status_porcelain(temp_dir.path()).await,
        Err(GitError::GitNotFound)
    ));
    assert!(matches!(
        git.push_upstream(temp_dir.path(), "origin", "main").await,
        Err(GitError::GitNotFound)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_real_git_non_zero_exit_carries_output() {
    let temp_dir = TempDir::new().unwrap();
    // sh treats the first git argument as a script path that does not exist
    let git = RealGit::new().with_binary("sh");

    match git.init(temp_dir.path()).await {
        Err(GitError::NonZeroExit { code, output }) => {
            assert_ne!(code, 0);
            assert!(!output.is_empty());
        }
        other => panic!("Expected NonZeroExit, got {:?}", other),
    }
}

#[cfg(feature = "git-tests")]
mod real_git {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_init_config_add_commit_log() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path();
        let git = RealGit::new();

        git.init(path).await.unwrap();
        git.set_config(path, "user.name", "Routines Sync").await.unwrap();
        git.set_config(path, "user.email", "sync@routines.local")
            .await
            .unwrap();
        std::fs::write(path.join("users.json"), "[]\n").unwrap();

        git.add_files(path, &["users.json".to_string()]).await.unwrap();
        let status = git.status_porcelain(path).await.unwrap();
        assert!(String::from_utf8_lossy(&status.stdout).starts_with("A "));

        git.commit(path, "first snapshot", None).await.unwrap();
        let log = git.last_commit(path).await.unwrap();
        assert!(String::from_utf8_lossy(&log.stdout).ends_with("first snapshot"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_add_get_set() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path();
        let git = RealGit::new();
        git.init(path).await.unwrap();

        assert!(git.remote_get_url(path, "origin").await.is_err());
        git.add_remote(path, "origin", "https://example.com/a.git")
            .await
            .unwrap();
        git.set_remote_url(path, "origin", "https://example.com/b.git")
            .await
            .unwrap();

        let url = git.remote_get_url(path, "origin").await.unwrap();
        assert_eq!(
            String::from_utf8_lossy(&url.stdout).trim(),
            "https://example.com/b.git"
        );
    }
}
