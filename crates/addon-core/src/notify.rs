// # Update Notification Helper
//
// Generates the `AddonUpdateNotification` add-on, which tells the player in
// game that updates are waiting.
//
// ## Layout
//
// ```text
// <addon_dir>/AddonUpdateNotification/
//   main.lua      embedded script, rewritten every time
//   updates.lua   Lua table of pending updates, only when there are any
// ```
//
// The helper is registered in `addons.txt` so the game loads it; the
// registry hides it from every listing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::checker::PendingUpdates;
use crate::error::{Error, Result};
use crate::registry::{InstalledSetRegistry, UPDATE_HELPER_NAME};
use crate::types::InstalledAddon;

const MAIN_SCRIPT: &str = include_str!("../assets/update_notification.lua");

/// Writes the update notification add-on
#[derive(Debug, Clone)]
pub struct UpdateNotifier {
    helper_dir: PathBuf,
}

impl UpdateNotifier {
    pub fn new<P: AsRef<Path>>(addon_dir: P) -> Self {
        Self {
            helper_dir: addon_dir.as_ref().join(UPDATE_HELPER_NAME),
        }
    }

    /// Directory of the helper add-on
    pub fn helper_dir(&self) -> &Path {
        &self.helper_dir
    }

    /// Regenerate the helper for `updates`
    ///
    /// An empty map still refreshes `main.lua` and clears any stale
    /// `updates.lua`.
    pub async fn generate(
        &self,
        registry: &InstalledSetRegistry,
        updates: &PendingUpdates,
    ) -> Result<()> {
        fs::create_dir_all(&self.helper_dir).await.map_err(|e| {
            Error::filesystem(format!(
                "Failed to create {}: {}",
                self.helper_dir.display(),
                e
            ))
        })?;

        registry.add(UPDATE_HELPER_NAME).await?;

        let main_path = self.helper_dir.join("main.lua");
        fs::write(&main_path, MAIN_SCRIPT).await.map_err(|e| {
            Error::filesystem(format!("Failed to write {}: {}", main_path.display(), e))
        })?;

        let updates_path = self.helper_dir.join("updates.lua");
        match fs::remove_file(&updates_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::filesystem(format!(
                    "Failed to remove {}: {}",
                    updates_path.display(),
                    e
                )));
            }
        }

        if updates.is_empty() {
            tracing::debug!("No pending updates, {} cleared", updates_path.display());
            return Ok(());
        }

        fs::write(&updates_path, render_updates(updates)).await.map_err(|e| {
            Error::filesystem(format!("Failed to write {}: {}", updates_path.display(), e))
        })?;

        tracing::info!("Update notification written for {} add-on(s)", updates.len());
        Ok(())
    }
}

/// Render pending updates as a Lua table, sorted by name
fn render_updates(updates: &PendingUpdates) -> String {
    let sorted: BTreeMap<&str, &InstalledAddon> = updates
        .iter()
        .map(|(name, addon)| (name.as_str(), addon))
        .collect();

    let mut out = String::from("{\n");
    for (name, addon) in sorted {
        out.push_str(&format!(
            "    ['{}'] = {{name=\"{}\", version=\"{}\"}},\n",
            lua_escape(name),
            lua_escape(addon.display_name()),
            lua_escape(&addon.version)
        ));
    }
    out.push_str("}\n");
    out
}

fn lua_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn pending(name: &str, alias: &str, version: &str) -> (String, InstalledAddon) {
        let mut addon = InstalledAddon::detected(name);
        addon.alias = alias.to_string();
        addon.version = version.to_string();
        (name.to_string(), addon)
    }

    #[test]
    fn test_render_sorted_table() {
        let updates: HashMap<_, _> = [
            pending("Raid_Frames", "Raid Frames", "v2"),
            pending("Chat", "", "v1.1"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            render_updates(&updates),
            "{\n    ['Chat'] = {name=\"Chat\", version=\"v1.1\"},\n    ['Raid_Frames'] = {name=\"Raid Frames\", version=\"v2\"},\n}\n"
        );
    }

    #[test]
    fn test_lua_escape() {
        assert_eq!(lua_escape(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(lua_escape("it's"), "it\\'s");
        assert_eq!(lua_escape("a\\b\nc"), "a\\\\b\\nc");
    }

    #[tokio::test]
    async fn test_generate_writes_and_clears() {
        let dir = tempdir().unwrap();
        let registry = InstalledSetRegistry::in_dir(dir.path());
        registry.create().await.unwrap();
        registry.add("Raid_Frames").await.unwrap();

        let notifier = UpdateNotifier::new(dir.path());
        let updates: HashMap<_, _> = [pending("Raid_Frames", "", "v2")].into_iter().collect();
        notifier.generate(&registry, &updates).await.unwrap();

        let helper = notifier.helper_dir();
        assert!(helper.join("main.lua").is_file());
        let table = std::fs::read_to_string(helper.join("updates.lua")).unwrap();
        assert!(table.contains("['Raid_Frames'] = {name=\"Raid_Frames\", version=\"v2\"}"));

        assert_eq!(registry.names().await, vec!["Raid_Frames"]);

        notifier.generate(&registry, &HashMap::new()).await.unwrap();
        assert!(helper.join("main.lua").is_file());
        assert!(!helper.join("updates.lua").exists());

        let on_disk = std::fs::read_to_string(registry.path()).unwrap();
        assert_eq!(on_disk, format!("Raid_Frames\n{}", UPDATE_HELPER_NAME));
    }
}
