use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::store::{KeyValueStore, THEME_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn toggled(self) -> Theme {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Theme::Dark => Palette {
                body_text: "#cbd5e1",
                muted_text: "#94a3b8",
            },
            Theme::Light => Palette {
                body_text: "#475569",
                muted_text: "#64748b",
            },
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("unknown theme {other:?}")),
        }
    }
}

/// Text colors the results view switches between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub body_text: &'static str,
    pub muted_text: &'static str,
}

/// Current theme plus change notifications. Every change is written back to
/// the store; a failed write keeps the in-memory theme.
pub struct ThemeContext {
    store: Arc<dyn KeyValueStore>,
    sender: watch::Sender<Theme>,
}

impl ThemeContext {
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let theme = match store.get(THEME_KEY).await {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring stored theme");
                Theme::default()
            }),
            Ok(None) => Theme::default(),
            Err(err) => {
                tracing::warn!(error = %err, "could not read stored theme");
                Theme::default()
            }
        };
        let (sender, _) = watch::channel(theme);
        Self { store, sender }
    }

    pub fn current(&self) -> Theme {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.sender.subscribe()
    }

    pub async fn set(&self, theme: Theme) {
        self.sender.send_replace(theme);
        if let Err(err) = self.store.set(THEME_KEY, theme.as_str()).await {
            tracing::warn!(error = %err, %theme, "could not persist theme");
        }
    }

    pub async fn toggle(&self) -> Theme {
        let next = self.current().toggled();
        self.set(next).await;
        next
    }

    /// Follows an operating-system dark-mode change.
    pub async fn apply_system_preference(&self, prefers_dark: bool) -> Theme {
        let theme = if prefers_dark { Theme::Dark } else { Theme::Light };
        self.set(theme).await;
        theme
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn defaults_to_dark_without_stored_value() {
        let context = ThemeContext::load(Arc::new(MemoryStore::new())).await;
        assert_eq!(context.current(), Theme::Dark);
        assert_eq!(context.current().palette().body_text, "#cbd5e1");
    }

    #[tokio::test]
    async fn toggle_persists_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let context = ThemeContext::load(store.clone()).await;
        let mut changes = context.subscribe();

        assert_eq!(context.toggle().await, Theme::Light);
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), Theme::Light);
        assert_eq!(store.get(THEME_KEY).await.unwrap().as_deref(), Some("light"));

        let reloaded = ThemeContext::load(store).await;
        assert_eq!(reloaded.current(), Theme::Light);
        assert_eq!(reloaded.current().palette().muted_text, "#64748b");
    }

    #[tokio::test]
    async fn system_preference_overrides_current() {
        let store = Arc::new(MemoryStore::new());
        store.set(THEME_KEY, "light").await.unwrap();
        let context = ThemeContext::load(store).await;

        assert_eq!(context.apply_system_preference(true).await, Theme::Dark);
        assert_eq!(context.current(), Theme::Dark);
    }

    #[tokio::test]
    async fn garbage_stored_theme_falls_back_to_dark() {
        let store = Arc::new(MemoryStore::new());
        store.set(THEME_KEY, "sepia").await.unwrap();
        let context = ThemeContext::load(store).await;
        assert_eq!(context.current(), Theme::Dark);
    }
}
