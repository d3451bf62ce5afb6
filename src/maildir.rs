//! Local mailbox access
//!
//! A Maildir (`new/`, `cur/`, Maildir++ sub-folders `.A.B`) or a plain
//! directory of `.eml` files. Moves keep the file name, so Maildir flags and
//! with them the read state travel with the message.

use crate::message::MessageRecord;
use crate::report::FolderCount;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One message file found in the mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaildirEntry {
    pub path: PathBuf,
    /// `new` or `cur`, `None` for plain `.eml` directories
    pub subdir: Option<String>,
    pub file_name: String,
    pub seen: bool,
}

/// Whether the Maildir info suffix (`unique:2,FLAGS`) carries `S`
pub fn is_seen(file_name: &str) -> bool {
    file_name
        .rsplit_once(":2,")
        .map(|(_, flags)| flags.contains('S'))
        .unwrap_or(false)
}

/// `DRY_RUN=true` (or `1`/`yes`) in the environment
pub fn dry_run_from_env() -> bool {
    std::env::var("DRY_RUN")
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct Maildir {
    root: PathBuf,
    plain: bool,
    dry_run: bool,
}

impl Maildir {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            bail!("Mailbox directory not found: {}", root.display());
        }
        let plain = !root.join("new").is_dir() && !root.join("cur").is_dir();
        if plain {
            log::debug!("{} has no new/ or cur/, reading .eml files", root.display());
        }
        Ok(Self {
            root,
            plain,
            dry_run: false,
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Messages of the top-level mailbox, `new/` before `cur/`, by file name
    pub fn list(&self) -> Result<Vec<MaildirEntry>> {
        if self.plain {
            return self.list_dir(&self.root, None);
        }
        self.list_maildir(&self.root)
    }

    fn list_maildir(&self, dir: &Path) -> Result<Vec<MaildirEntry>> {
        let mut entries = Vec::new();
        for subdir in ["new", "cur"] {
            let sub = dir.join(subdir);
            if sub.is_dir() {
                entries.extend(self.list_dir(&sub, Some(subdir))?);
            }
        }
        Ok(entries)
    }

    /// Every folder with its message count, the mailbox root first as
    /// `INBOX`, then sub-folders by name (`Shopping/NewStore`).
    pub fn folder_counts(&self) -> Result<Vec<FolderCount>> {
        let mut folders = vec![FolderCount {
            folder: "INBOX".to_string(),
            count: self.list()?.len(),
        }];

        if self.plain {
            self.collect_plain_folders(&self.root, "", &mut folders)?;
            return Ok(folders);
        }

        let mut subfolders = Vec::new();
        for entry in read_dir_sorted(&self.root)? {
            let name = entry.file_name().to_string_lossy().to_string();
            match name.strip_prefix('.') {
                Some(rest) if !rest.is_empty() && entry.path().is_dir() => {
                    subfolders.push((rest.replace('.', "/"), entry.path()));
                }
                _ => {}
            }
        }
        for (folder, path) in subfolders {
            let count = self.list_maildir(&path)?.len();
            folders.push(FolderCount { folder, count });
        }
        Ok(folders)
    }

    fn collect_plain_folders(
        &self,
        dir: &Path,
        prefix: &str,
        folders: &mut Vec<FolderCount>,
    ) -> Result<()> {
        for entry in read_dir_sorted(dir)? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !path.is_dir() || name.starts_with('.') {
                continue;
            }
            let folder = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let count = self.list_dir(&path, None)?.len();
            folders.push(FolderCount {
                folder: folder.clone(),
                count,
            });
            self.collect_plain_folders(&path, &folder, folders)?;
        }
        Ok(())
    }

    fn list_dir(&self, dir: &Path, subdir: Option<&str>) -> Result<Vec<MaildirEntry>> {
        let mut entries = Vec::new();
        let read_dir = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        for entry in read_dir {
            let entry =
                entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }
            if subdir.is_none()
                && !path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("eml"))
                    .unwrap_or(false)
            {
                continue;
            }

            let seen = match subdir {
                Some("cur") => is_seen(&file_name),
                _ => false,
            };
            entries.push(MaildirEntry {
                path,
                subdir: subdir.map(str::to_string),
                file_name,
                seen,
            });
        }

        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    pub fn read(&self, entry: &MaildirEntry) -> Result<MessageRecord> {
        let bytes = fs::read(&entry.path)
            .with_context(|| format!("Failed to read message: {}", entry.path.display()))?;
        Ok(MessageRecord::parse(&bytes).with_seen(entry.seen))
    }

    /// On-disk directory of a folder path such as `INBOX/Shopping/NewStore`
    pub fn folder_path(&self, folder: &str) -> PathBuf {
        let parts = folder_components(folder);
        if parts.is_empty() {
            return self.root.clone();
        }
        if self.plain {
            parts.iter().fold(self.root.clone(), |path, part| path.join(part))
        } else {
            self.root.join(format!(".{}", parts.join(".")))
        }
    }

    /// Create the folder if missing; returns its directory
    pub fn ensure_folder(&self, folder: &str) -> Result<PathBuf> {
        let path = self.folder_path(folder);
        if self.plain {
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create folder: {}", path.display()))?;
            return Ok(path);
        }

        for sub in ["cur", "new", "tmp"] {
            let dir = path.join(sub);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create folder: {}", dir.display()))?;
        }
        let marker = path.join("maildirfolder");
        if path != self.root && !marker.exists() {
            fs::write(&marker, b"")
                .with_context(|| format!("Failed to create {}", marker.display()))?;
        }
        Ok(path)
    }

    /// Move a message into `folder`; under dry-run only logs.
    ///
    /// An existing file at the target is never replaced.
    pub fn move_to(&self, entry: &MaildirEntry, folder: &str) -> Result<PathBuf> {
        let folder_dir = self.folder_path(folder);
        let target = match &entry.subdir {
            Some(subdir) => folder_dir.join(subdir).join(&entry.file_name),
            None => folder_dir.join(&entry.file_name),
        };

        if target != entry.path && target.exists() {
            bail!(
                "Not moving {}: {} already exists",
                entry.path.display(),
                target.display()
            );
        }

        if self.dry_run {
            log::info!(
                "[DRY RUN] Would move {} -> {}",
                entry.file_name,
                folder
            );
            return Ok(target);
        }

        if target == entry.path {
            return Ok(target);
        }

        self.ensure_folder(folder)?;
        fs::rename(&entry.path, &target).with_context(|| {
            format!(
                "Failed to move {} to {}",
                entry.path.display(),
                target.display()
            )
        })?;
        log::info!("Moved {} -> {}", entry.file_name, folder);
        Ok(target)
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read entry in {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// `INBOX/A/B` -> `["A", "B"]`; the mailbox root is `INBOX`
fn folder_components(folder: &str) -> Vec<String> {
    let mut parts: Vec<String> = folder
        .split('/')
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "." && *p != "..")
        .map(|p| p.replace('.', "_"))
        .collect();
    if parts
        .first()
        .map(|p| p.eq_ignore_ascii_case("INBOX"))
        .unwrap_or(false)
    {
        parts.remove(0);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "From: Newsletter <info@newstore.com>\n\
                       Subject: Weekly deals inside!\n\
                       Message-ID: <1@newstore.com>\n\
                       Date: Mon, 1 Jan 2024 12:00:00 +0000\n\
                       \n\
                       body\n";

    fn maildir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["new", "cur", "tmp"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        fs::write(dir.path().join("new/1700000000.1.host"), RAW).unwrap();
        fs::write(dir.path().join("cur/1700000001.2.host:2,S"), RAW).unwrap();
        fs::write(dir.path().join("cur/1700000002.3.host:2,F"), RAW).unwrap();
        dir
    }

    #[test]
    fn test_flags() {
        assert!(is_seen("123.host:2,FS"));
        assert!(!is_seen("123.host:2,F"));
        assert!(!is_seen("123.host"));
    }

    #[test]
    fn test_list_and_read_state() {
        let dir = maildir();
        let mailbox = Maildir::open(dir.path()).unwrap();
        let entries = mailbox.list().unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].subdir.as_deref(), Some("new"));
        let seen: Vec<bool> = entries.iter().map(|e| e.seen).collect();
        assert_eq!(seen, vec![false, true, false]);

        let message = mailbox.read(&entries[1]).unwrap();
        assert_eq!(message.subject, "Weekly deals inside!");
        assert!(message.seen);
    }

    #[test]
    fn test_folder_paths() {
        let dir = maildir();
        let mailbox = Maildir::open(dir.path()).unwrap();
        assert_eq!(
            mailbox.folder_path("INBOX/Shopping/NewStore"),
            dir.path().join(".Shopping.NewStore")
        );
        assert_eq!(mailbox.folder_path("Spam"), dir.path().join(".Spam"));
        assert_eq!(mailbox.folder_path("INBOX"), dir.path());
        assert_eq!(mailbox.folder_path("../etc"), dir.path().join(".etc"));
    }

    #[test]
    fn test_move_keeps_flags_and_subdir() {
        let dir = maildir();
        let mailbox = Maildir::open(dir.path()).unwrap();
        let entries = mailbox.list().unwrap();

        let target = mailbox.move_to(&entries[1], "INBOX/Shopping/NewStore").unwrap();
        assert_eq!(
            target,
            dir.path().join(".Shopping.NewStore/cur/1700000001.2.host:2,S")
        );
        assert!(target.exists());
        assert!(!entries[1].path.exists());
        assert!(dir.path().join(".Shopping.NewStore/tmp").is_dir());
        assert!(dir.path().join(".Shopping.NewStore/maildirfolder").exists());
    }

    #[test]
    fn test_dry_run_does_not_move() {
        let dir = maildir();
        let mailbox = Maildir::open(dir.path()).unwrap().with_dry_run(true);
        let entries = mailbox.list().unwrap();

        mailbox.move_to(&entries[0], "Spam").unwrap();
        assert!(entries[0].path.exists());
        assert!(!dir.path().join(".Spam").exists());
    }

    #[test]
    fn test_plain_eml_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.eml"), RAW).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mailbox = Maildir::open(dir.path()).unwrap();
        let entries = mailbox.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].subdir.is_none());

        let target = mailbox.move_to(&entries[0], "INBOX/Newsletter").unwrap();
        assert_eq!(target, dir.path().join("Newsletter/a.eml"));
        assert!(target.exists());
    }

    #[test]
    fn test_move_never_overwrites_filed_message() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Newsletter")).unwrap();
        fs::write(dir.path().join("Newsletter/a.eml"), "OLD MESSAGE").unwrap();
        fs::write(dir.path().join("a.eml"), "From: x@y.example\n\nNEW").unwrap();

        let mailbox = Maildir::open(dir.path()).unwrap();
        let entries = mailbox.list().unwrap();
        assert!(mailbox.move_to(&entries[0], "Newsletter").is_err());
        assert!(mailbox
            .clone()
            .with_dry_run(true)
            .move_to(&entries[0], "Newsletter")
            .is_err());

        assert_eq!(
            fs::read_to_string(dir.path().join("Newsletter/a.eml")).unwrap(),
            "OLD MESSAGE"
        );
        assert!(dir.path().join("a.eml").exists());
    }

    #[test]
    fn test_folder_counts() {
        let dir = maildir();
        let mailbox = Maildir::open(dir.path()).unwrap();
        let entries = mailbox.list().unwrap();
        mailbox.move_to(&entries[0], "INBOX/Shopping/NewStore").unwrap();
        mailbox.ensure_folder("Archive").unwrap();

        let counts: Vec<(String, usize)> = mailbox
            .folder_counts()
            .unwrap()
            .into_iter()
            .map(|f| (f.folder, f.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("INBOX".to_string(), 2),
                ("Archive".to_string(), 0),
                ("Shopping/NewStore".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_plain_folder_counts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Shopping/Amazon")).unwrap();
        fs::write(dir.path().join("Shopping/Amazon/a.eml"), RAW).unwrap();
        fs::write(dir.path().join("b.eml"), RAW).unwrap();

        let mailbox = Maildir::open(dir.path()).unwrap();
        let counts: Vec<(String, usize)> = mailbox
            .folder_counts()
            .unwrap()
            .into_iter()
            .map(|f| (f.folder, f.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("INBOX".to_string(), 1),
                ("Shopping".to_string(), 0),
                ("Shopping/Amazon".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Maildir::open(dir.path().join("absent")).is_err());
    }
}
