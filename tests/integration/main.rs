//! Integration tests for image-prune

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn image_prune() -> Command {
        cargo_bin_cmd!("image-prune")
    }

    #[test]
    fn help_displays() {
        image_prune()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("garbage collect cached CI test VM images"))
            .stdout(predicate::str::contains("--checkout-only"));
    }

    #[test]
    fn version_displays() {
        image_prune()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("image-prune"));
    }

    #[test]
    fn backends_conflict() {
        image_prune()
            .args(["--directory", "/tmp/images", "--s3", "s3://ci-images/vm/"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot be used with"));
    }

    #[test]
    fn invalid_s3_url() {
        image_prune()
            .args(["--s3", "ftp://host/bucket", "--config", "/nonexistent/config.toml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid backend URL"));
    }
}

mod prune_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Checkout whose HEAD links `images/alpha -> a-111.qcow2`, plus a cache
    /// holding a-111.qcow2, b-222.qcow2 and notes.txt
    struct Fixture {
        root: TempDir,
        repo: PathBuf,
        cache: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let repo = root.path().join("repo");
            let cache = root.path().join("cache");
            fs::create_dir_all(repo.join("images")).unwrap();
            fs::create_dir_all(&cache).unwrap();

            git(&repo, &["init", "--quiet", "-b", "main"]);
            std::os::unix::fs::symlink("a-111.qcow2", repo.join("images/alpha")).unwrap();
            git(&repo, &["add", "images"]);
            git(
                &repo,
                &[
                    "-c",
                    "user.name=Image Prune",
                    "-c",
                    "user.email=prune@example.com",
                    "-c",
                    "commit.gpgsign=false",
                    "commit",
                    "--quiet",
                    "-m",
                    "images: add alpha",
                ],
            );

            for name in ["a-111.qcow2", "b-222.qcow2", "notes.txt"] {
                fs::write(cache.join(name), b"image").unwrap();
            }

            Self {
                root,
                repo,
                cache,
            }
        }

        fn age(&self, name: &str, days: u64) {
            let file = File::options()
                .write(true)
                .open(self.cache.join(name))
                .unwrap();
            file.set_modified(SystemTime::now() - Duration::from_secs(days * 86_400))
                .unwrap();
        }

        fn exists(&self, name: &str) -> bool {
            self.cache.join(name).exists()
        }

        fn command(&self, min_free_gb: &str) -> Command {
            self.command_in(&self.repo, min_free_gb)
        }

        fn command_in(&self, repo: &Path, min_free_gb: &str) -> Command {
            let mut cmd = cargo_bin_cmd!("image-prune");
            cmd.env_remove("IMAGE_PRUNE_CONFIG")
                .env_remove("IMAGE_PRUNE_S3_QUOTA_BYTES")
                .env_remove("IMAGE_PRUNE_MAX_AGE_DAYS")
                .env("IMAGE_PRUNE_MIN_FREE_GB", min_free_gb)
                .arg("--checkout-only")
                .arg("--repo")
                .arg(repo)
                .arg("--directory")
                .arg(&self.cache)
                .arg("--config")
                .arg(self.root.path().join("nonexistent.toml"));
            cmd
        }
    }

    fn git(repo: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn forced_dry_run_lists_non_keepers() {
        let fixture = Fixture::new();

        fixture
            .command("0")
            .args(["--force", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would delete 1 image(s)"))
            .stdout(predicate::str::contains("b-222.qcow2"))
            .stdout(predicate::str::contains("a-111.qcow2").not());

        assert!(fixture.exists("a-111.qcow2"));
        assert!(fixture.exists("b-222.qcow2"));
    }

    #[test]
    fn force_deletes_non_keepers() {
        let fixture = Fixture::new();

        fixture.command("0").arg("--force").assert().success();

        assert!(fixture.exists("a-111.qcow2"));
        assert!(!fixture.exists("b-222.qcow2"));
        assert!(fixture.exists("notes.txt"));
    }

    #[test]
    fn fresh_images_are_kept() {
        let fixture = Fixture::new();

        fixture
            .command("0")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to prune."));

        assert!(fixture.exists("b-222.qcow2"));
    }

    #[test]
    fn expired_images_are_deleted() {
        let fixture = Fixture::new();
        fixture.age("a-111.qcow2", 30);
        fixture.age("b-222.qcow2", 30);
        fixture.age("notes.txt", 30);

        fixture.command("0").assert().success();

        assert!(fixture.exists("a-111.qcow2"));
        assert!(!fixture.exists("b-222.qcow2"));
        assert!(fixture.exists("notes.txt"));
    }

    #[test]
    fn unrelievable_pressure_fails() {
        let fixture = Fixture::new();

        fixture
            .command("1000000")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Insufficient space"))
            .stderr(predicate::str::contains("--force"));

        assert!(fixture.exists("a-111.qcow2"));
        assert!(!fixture.exists("b-222.qcow2"));
    }

    #[test]
    fn dry_run_under_pressure_fails() {
        let fixture = Fixture::new();

        fixture
            .command("1000000")
            .arg("--dry-run")
            .assert()
            .failure()
            .stdout(predicate::str::contains("Dry run - no images removed."))
            .stderr(predicate::str::contains("Insufficient space"));

        assert!(fixture.exists("a-111.qcow2"));
        assert!(fixture.exists("b-222.qcow2"));
    }

    #[test]
    fn json_report() {
        let fixture = Fixture::new();

        let output = fixture
            .command("0")
            .args(["--force", "--dry-run", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["dry_run"], true);
        assert_eq!(report["pressure_remains"], false);

        let decisions = report["decisions"].as_array().unwrap();
        assert_eq!(decisions.len(), 3);
        let action_of = |name: &str| {
            decisions
                .iter()
                .find(|d| d["name"] == name)
                .map(|d| d["action"].clone())
                .unwrap()
        };
        assert_eq!(action_of("a-111.qcow2"), "retain");
        assert_eq!(action_of("b-222.qcow2"), "delete");
        assert_eq!(action_of("notes.txt"), "retain");
    }

    #[test]
    fn not_a_repository_fails() {
        let fixture = Fixture::new();
        let elsewhere = TempDir::new().unwrap();

        fixture
            .command_in(elsewhere.path(), "0")
            .arg("--force")
            .assert()
            .failure()
            .stderr(predicate::str::contains("git command failed"))
            .stderr(predicate::str::contains("Hint:"));

        assert!(fixture.exists("b-222.qcow2"));
    }
}
