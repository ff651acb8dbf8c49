//! File-backed message store.
//!
//! Each stored message becomes `<root>/<user_id>/<ulid>.eml`. Files are
//! written under a `.tmp_` name and renamed into place, so a listing never
//! sees a partial message. ULIDs sort by creation time.

use std::{
    fmt::Write as _,
    io::{Error, ErrorKind},
    path::PathBuf,
};

use async_trait::async_trait;
use chrono::Utc;
use relaymail_common::{
    UserId,
    error::StoreError,
    internal,
    mime::encode_header_value,
    traits::{MessageStore, NewMessage},
};
use tokio::fs;
use ulid::Ulid;

const TEMP_PREFIX: &str = ".tmp_";
const EXTENSION: &str = "eml";

#[derive(Debug, Clone)]
pub struct FileMessageStore {
    root: PathBuf,
}

impl FileMessageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or the path is not a
    /// directory.
    pub fn init(&self) -> Result<(), StoreError> {
        if self.root.try_exists()? {
            if !self.root.is_dir() {
                return Err(Error::new(
                    ErrorKind::NotADirectory,
                    format!("Expected {} to be a directory", self.root.display()),
                )
                .into());
            }
        } else {
            internal!("{} does not exist, creating...", self.root.display());
            std::fs::create_dir_all(&self.root)?;
        }

        Ok(())
    }

    fn mailbox(&self, user_id: UserId) -> PathBuf {
        self.root.join(user_id.to_string())
    }

    /// Stored message ids for `user_id`, oldest first.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Ulid>, StoreError> {
        let mut entries = match fs::read_dir(self.mailbox(user_id)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if !name.starts_with(TEMP_PREFIX)
                && let Some(id) = name
                    .strip_suffix(EXTENSION)
                    .and_then(|stem| stem.strip_suffix('.'))
                    .and_then(|stem| Ulid::from_string(stem).ok())
            {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// The stored text of one message.
    pub async fn read(&self, user_id: UserId, id: Ulid) -> Result<String, StoreError> {
        let path = self.mailbox(user_id).join(format!("{id}.{EXTENSION}"));
        Ok(fs::read_to_string(path).await?)
    }
}

/// Serialise a stored message: a minimal header block and the decoded body.
fn render(message: &NewMessage) -> String {
    let mut rendered = String::with_capacity(message.body.len() + 256);
    let _ = write!(
        rendered,
        "Message-ID: {}\r\nDate: {}\r\nFrom: {}\r\nTo: {}\r\nSubject: {}\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\r\n",
        message.message_id,
        Utc::now().to_rfc2822(),
        message.from,
        message.to,
        encode_header_value(&message.subject),
    );
    rendered.push_str(&message.body);
    rendered
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn store_message(&self, message: NewMessage) -> Result<String, StoreError> {
        let directory = self.mailbox(message.user_id);
        fs::create_dir_all(&directory).await?;

        let id = Ulid::new();
        let filename = format!("{id}.{EXTENSION}");
        let path = directory.join(&filename);
        let temp = directory.join(format!("{TEMP_PREFIX}{filename}"));

        fs::write(&temp, render(&message)).await?;
        fs::rename(&temp, &path).await?;

        internal!(
            level = INFO,
            "Stored {} ({} bytes) for user {} at {}",
            message.message_id,
            message.size,
            message.user_id,
            path.display()
        );

        Ok(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn message(user_id: UserId, subject: &str, body: &str) -> NewMessage {
        NewMessage {
            message_id: format!("<1700000000.{user_id}@mx.test>"),
            user_id,
            from: "alice@example.com".to_string(),
            to: "bob@mx.test".to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            size: body.len(),
        }
    }

    #[tokio::test]
    async fn stores_one_file_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMessageStore::new(dir.path().join("mail"));
        store.init().unwrap();

        let first = store
            .store_message(message(7, "Hello", "First\n"))
            .await
            .unwrap();
        // ULIDs only order across milliseconds.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store
            .store_message(message(7, "Grüße", "Second\n"))
            .await
            .unwrap();

        let ids = store.list(7).await.unwrap();
        assert_eq!(
            ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![first, second]
        );

        let stored = store.read(7, ids[0]).await.unwrap();
        assert!(stored.starts_with("Message-ID: <1700000000.7@mx.test>\r\n"));
        assert!(stored.contains("Subject: Hello\r\n"));
        assert!(stored.ends_with("\r\n\r\nFirst\n"));

        let encoded = store.read(7, ids[1]).await.unwrap();
        assert!(encoded.contains("Subject: =?UTF-8?B?"));

        assert!(store.list(8).await.unwrap().is_empty());
        assert!(
            std::fs::read_dir(dir.path().join("mail/7"))
                .unwrap()
                .all(|entry| !entry.unwrap().file_name().to_string_lossy().starts_with(".tmp_"))
        );
    }

    #[test]
    fn init_rejects_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(FileMessageStore::new(file.path()).init().is_err());
    }
}
