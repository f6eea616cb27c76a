//! Shared UI icons and emojis.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Workflow indicators
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[R]");
pub static LOCK: Emoji<'_, '_> = Emoji("🔒 ", "[LOCK]");
