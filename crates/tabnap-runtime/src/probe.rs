//! Exception predicate evaluation for one tab.
//!
//! Predicates are recomputed on every call. Round-trip predicates run
//! concurrently; a disabled toggle never issues its query.

use std::sync::Arc;

use tabnap_core::Preferences;
use tabnap_core::exceptions::{ExceptionKind, ExceptionResult};
use tabnap_core::whitelist;
use tabnap_host::{HostError, PowerSource};

use crate::agent::PageState;
use crate::protocol::CoordinatorLink;

pub async fn evaluate_all(
    prefs: &Preferences,
    page: &PageState,
    link: &CoordinatorLink,
    power: &Arc<dyn PowerSource>,
) -> Result<ExceptionResult, HostError> {
    let audio = async {
        ExceptionKind::Audio.enabled(prefs) && link.is_playing().await
    };
    let pinned = async {
        ExceptionKind::Pinned.enabled(prefs) && link.is_pinned().await
    };
    let battery = async {
        if ExceptionKind::Battery.enabled(prefs) {
            // power sources read files
            let power = Arc::clone(power);
            match tokio::task::spawn_blocking(move || power.on_external_power()).await {
                Ok(reading) => reading,
                Err(e) => Err(HostError::Unavailable(format!("power query task failed: {e}"))),
            }
        } else {
            Ok(false)
        }
    };
    let (audio, pinned, battery) = tokio::join!(audio, pinned, battery);

    let result = ExceptionResult {
        audio,
        pinned,
        battery: battery?,
        form: ExceptionKind::Form.enabled(prefs) && page.form_dirty,
        whitelist: whitelist::matches(&prefs.whitelist, &page.url),
        notification: ExceptionKind::Notification.enabled(prefs) && page.notification_granted,
    };

    for kind in result.active() {
        decision!(
            prefs.log,
            link.tab_id(),
            "{}, tab discard is skipped",
            kind.reason()
        );
    }
    Ok(result)
}
