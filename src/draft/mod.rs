// Draft tracking: pick payloads and the feed reconciler.

pub mod pick;
pub mod reconciler;
