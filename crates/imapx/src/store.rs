//! The IMAP store: live mailbox table, folder registry and shared services

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use log::{debug, info};

use crate::config::StoreSettings;
use crate::connection::{
    CancellationToken, Connection, ConnectionManager, NoopHook, OperationHook, RetryContext,
    retry_once,
};
use crate::error::Result;
use crate::folder::{Folder, Summary};
use crate::models::{Mailbox, MailboxListing, QuotaInfo};
use crate::storage::{
    FileMessageCache, InMemoryMessageCache, InMemorySummaryStore, MessageCache,
    SqliteSummaryStore, SummaryStore,
};

/// Builder for [`Store`]
pub struct StoreBuilder {
    connections: Arc<dyn ConnectionManager>,
    hook: Arc<dyn OperationHook>,
    settings: StoreSettings,
    summaries: Arc<dyn SummaryStore>,
    cache: Arc<dyn MessageCache>,
    online: bool,
}

impl StoreBuilder {
    fn new(connections: Arc<dyn ConnectionManager>) -> Self {
        Self {
            connections,
            hook: Arc::new(NoopHook),
            settings: StoreSettings::default(),
            summaries: Arc::new(InMemorySummaryStore::default()),
            cache: Arc::new(InMemoryMessageCache::default()),
            online: true,
        }
    }

    pub fn hook(mut self, hook: Arc<dyn OperationHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn settings(mut self, settings: StoreSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn summaries(mut self, summaries: Arc<dyn SummaryStore>) -> Self {
        self.summaries = summaries;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn MessageCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Persist summaries in `data_dir/summary.db` and messages under
    /// `data_dir/messages`
    pub fn data_dir(mut self, data_dir: &Path) -> anyhow::Result<Self> {
        self.summaries = Arc::new(SqliteSummaryStore::new(data_dir.join("summary.db"))?);
        self.cache = Arc::new(FileMessageCache::new(data_dir.join("messages"))?);
        Ok(self)
    }

    pub fn build(self) -> Arc<Store> {
        Arc::new(Store {
            connections: self.connections,
            hook: self.hook,
            settings: self.settings,
            summaries: self.summaries,
            cache: self.cache,
            online: AtomicBool::new(self.online),
            mailboxes: RwLock::new(HashMap::new()),
            mailbox_names: RwLock::new(HashMap::new()),
            quotas: RwLock::new(HashMap::new()),
            folders: Mutex::new(HashMap::new()),
        })
    }
}

/// Owner of the live mailboxes and the open folders of one account
///
/// Folders hold only weak references to mailboxes, so tearing down the
/// mailbox table on a lost connection unbinds every folder at once.
pub struct Store {
    connections: Arc<dyn ConnectionManager>,
    hook: Arc<dyn OperationHook>,
    settings: StoreSettings,
    summaries: Arc<dyn SummaryStore>,
    cache: Arc<dyn MessageCache>,
    online: AtomicBool,
    /// Live mailboxes by mailbox name
    mailboxes: RwLock<HashMap<String, Arc<Mailbox>>>,
    /// Folder path to mailbox name, where the two differ
    mailbox_names: RwLock<HashMap<String, String>>,
    /// Quota details by quota root
    quotas: RwLock<HashMap<String, QuotaInfo>>,
    folders: Mutex<HashMap<String, Weak<Folder>>>,
}

impl Store {
    pub fn builder(connections: Arc<dyn ConnectionManager>) -> StoreBuilder {
        StoreBuilder::new(connections)
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn summaries(&self) -> &dyn SummaryStore {
        self.summaries.as_ref()
    }

    pub fn cache(&self) -> &dyn MessageCache {
        self.cache.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        if self.online.swap(online, Ordering::SeqCst) != online {
            info!("[STORE] Going {}", if online { "online" } else { "offline" });
        }
    }

    /// Open a folder, sharing the instance with anyone who has it open
    pub fn open_folder(self: &Arc<Self>, path: &str) -> Result<Arc<Folder>> {
        let mut folders = self.folders.lock().unwrap();
        if let Some(folder) = folders.get(path).and_then(Weak::upgrade) {
            return Ok(folder);
        }

        let summary = match self.summaries.load(path)? {
            Some(record) => Summary::from_record(record),
            None => Summary::new(),
        };
        debug!("[STORE] Opened {} with {} messages", path, summary.len());

        let folder = Arc::new(Folder::new(Arc::clone(self), path, summary));
        folders.insert(path.to_string(), Arc::downgrade(&folder));
        Ok(folder)
    }

    /// Folder paths currently open
    pub fn open_folders(&self) -> Vec<String> {
        let mut folders = self.folders.lock().unwrap();
        folders.retain(|_, folder| folder.strong_count() > 0);
        let mut paths: Vec<String> = folders.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub(crate) fn rename_folder_entry(&self, old_path: &str, new_path: &str) {
        let mut folders = self.folders.lock().unwrap();
        if let Some(folder) = folders.remove(old_path) {
            folders.insert(new_path.to_string(), folder);
        }
        let mut names = self.mailbox_names.write().unwrap();
        names.remove(old_path);
    }

    /// Mailbox name for a folder path
    pub fn mailbox_name(&self, folder_path: &str) -> String {
        self.mailbox_names
            .read()
            .unwrap()
            .get(folder_path)
            .cloned()
            .unwrap_or_else(|| folder_path.to_string())
    }

    /// Map a folder path to a differently named mailbox
    pub fn set_mailbox_name(&self, folder_path: &str, mailbox_name: &str) {
        self.mailbox_names
            .write()
            .unwrap()
            .insert(folder_path.to_string(), mailbox_name.to_string());
    }

    /// Live mailbox by name
    pub fn mailbox(&self, name: &str) -> Option<Arc<Mailbox>> {
        let mailboxes = self.mailboxes.read().unwrap();
        mailboxes
            .get(name)
            .or_else(|| mailboxes.values().find(|mailbox| mailbox.is_named(name)))
            .cloned()
    }

    /// Add a listed mailbox to the live table, or refresh the one already there
    pub fn register_mailbox(&self, listing: &MailboxListing) -> Arc<Mailbox> {
        let mut mailboxes = self.mailboxes.write().unwrap();
        if let Some(existing) = mailboxes.get(&listing.name) {
            if listing.uidvalidity != 0 {
                existing.set_uidvalidity(listing.uidvalidity);
            }
            return Arc::clone(existing);
        }

        let mailbox = Arc::new(Mailbox::new(listing.name.clone(), listing.uidvalidity));
        mailboxes.insert(listing.name.clone(), Arc::clone(&mailbox));
        mailbox
    }

    /// Tear down the mailbox table; every folder binding dies with it, and
    /// so do the search results gathered under the old session
    pub fn connection_lost(&self) {
        {
            let mut mailboxes = self.mailboxes.write().unwrap();
            if !mailboxes.is_empty() {
                info!("[STORE] Dropping {} mailboxes after connection loss", mailboxes.len());
            }
            mailboxes.clear();
        }

        let open: Vec<Arc<Folder>> = self
            .folders
            .lock()
            .unwrap()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for folder in open {
            folder.search_cache().clear();
        }
    }

    pub fn cache_quota(&self, quota: QuotaInfo) {
        self.quotas
            .write()
            .unwrap()
            .insert(quota.root.clone(), quota);
    }

    pub fn quota(&self, root: &str) -> Option<QuotaInfo> {
        self.quotas.read().unwrap().get(root).cloned()
    }

    /// Run `op` on a connection for `folder_path`, retrying once after a
    /// reconnect
    pub fn with_connection<T>(
        &self,
        folder_path: &str,
        cancel: &CancellationToken,
        op: impl FnMut(&dyn Connection) -> Result<T>,
    ) -> Result<T> {
        let ctx = RetryContext {
            manager: self.connections.as_ref(),
            hook: self.hook.as_ref(),
            folder_path,
            cancel,
        };
        retry_once(&ctx, || self.connection_lost(), op)
    }
}
