//! ## tronadapt-reporter::adapter
//! **Plug-in seam between the reporter and the implementation under test**

use tronadapt_core::VirtualThread;
use tronadapt_protocols::ChannelId;

use crate::error::ReporterError;
use crate::reporter::Reporter;

/// Test adapter driven by a [`Reporter`].
///
/// `configure` runs once per tester connection on the reporter thread. It
/// registers channels and variables through the reporter and usually keeps
/// a clone of it for reporting outputs later.
///
/// `perform` delivers one input action on the reporter thread. It must not
/// block or report outputs itself: the reporter reads nothing else from the
/// tester until it returns. Queue the input for another thread instead.
pub trait Adapter: Send + Sync + 'static {
    fn configure(&self, reporter: &Reporter) -> Result<(), ReporterError>;

    fn perform(&self, thread: &VirtualThread, channel: ChannelId, params: &[i32]);
}
