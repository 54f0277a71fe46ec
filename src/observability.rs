use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("palaver.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("palaver.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("palaver.client.request_duration_seconds");

pub(crate) static HISTORY_FETCHES: Counter = Counter::new("palaver.history.fetches");
pub(crate) static HISTORY_RETRIES: Counter = Counter::new("palaver.history.retries");
pub(crate) static HISTORY_RETRY_BACKOFF: Moments =
    Moments::new("palaver.history.retry_backoff_seconds");
pub(crate) static HISTORY_FAILURES: Counter = Counter::new("palaver.history.failures");

pub(crate) static SEND_SENT: Counter = Counter::new("palaver.send.sent");
pub(crate) static SEND_FAILURES: Counter = Counter::new("palaver.send.failures");
pub(crate) static SEND_REJECTED: Counter = Counter::new("palaver.send.rejected");
pub(crate) static SEND_COALESCED: Counter = Counter::new("palaver.send.coalesced");

pub(crate) static SESSION_EXPIRED: Counter = Counter::new("palaver.session.expired");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&HISTORY_FETCHES);
    collector.register_counter(&HISTORY_RETRIES);
    collector.register_moments(&HISTORY_RETRY_BACKOFF);
    collector.register_counter(&HISTORY_FAILURES);

    collector.register_counter(&SEND_SENT);
    collector.register_counter(&SEND_FAILURES);
    collector.register_counter(&SEND_REJECTED);
    collector.register_counter(&SEND_COALESCED);

    collector.register_counter(&SESSION_EXPIRED);
}
