//! Routes a finished error record to the registered callbacks.

use crate::config::{Config, ErrorCallback};
use crate::record::{ErrorKind, ErrorRecord};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Dispatches `record` to the most specific callback, applies the error
/// interceptor, and falls back to `on_error` when nothing specific handled it.
///
/// Routing by kind:
///
/// - `abort` goes to `on_abort`.
/// - `network` goes to `on_network_error`.
/// - `http` goes through the status ladder: 404, 401, 429, `>= 500`, then `4xx`.
/// - `application` goes through the status ladder, then `on_application_error`.
///
/// A record already marked `handled_by_client` is returned unchanged, so a
/// logical request never reaches the callbacks twice.
pub(crate) fn dispatch(record: ErrorRecord, config: &Config) -> ErrorRecord {
    if record.handled_by_client {
        return record;
    }

    if config.debug {
        log_record(&record);
    }

    let callbacks = &config.callbacks;
    let handled = match record.kind() {
        ErrorKind::Abort => call(&callbacks.on_abort, &record),
        ErrorKind::Network => call(&callbacks.on_network_error, &record),
        ErrorKind::Http => status_ladder(&record, config),
        ErrorKind::Application => {
            status_ladder(&record, config) || call(&callbacks.on_application_error, &record)
        }
    };

    let mut record = match &config.error_interceptor {
        Some(transform) => transform(record),
        None => record,
    };
    record.handled_by_client = true;

    if !handled {
        call(&callbacks.on_error, &record);
    }

    record
}

/// First match wins; only configured callbacks count as a match.
fn status_ladder(record: &ErrorRecord, config: &Config) -> bool {
    let callbacks = &config.callbacks;
    let status = record.status;

    let handler = match status {
        404 if callbacks.on_not_found.is_some() => &callbacks.on_not_found,
        401 if callbacks.on_unauthorized.is_some() => &callbacks.on_unauthorized,
        429 if callbacks.on_rate_limit.is_some() => &callbacks.on_rate_limit,
        500..=u16::MAX if callbacks.on_server_error.is_some() => &callbacks.on_server_error,
        400..=499 => &callbacks.on_client_error,
        _ => return false,
    };

    call(handler, record)
}

fn call(callback: &Option<ErrorCallback>, record: &ErrorRecord) -> bool {
    match callback {
        Some(callback) => {
            callback(record);
            true
        }
        None => false,
    }
}

fn log_record(record: &ErrorRecord) {
    let id: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    let label = record.kind().to_string().to_uppercase();
    let details = serde_json::to_string_pretty(record).unwrap_or_else(|e| e.to_string());

    tracing::debug!("===== {} ERROR {} START =====", label, id);
    tracing::debug!(error_id = %id, "Error details: {}", details);
    tracing::debug!("===== {} ERROR {} END =====", label, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortReason;
    use crate::config::Callbacks;
    use crate::record::{NetworkInfo, ResponseInfo};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(calls: &Calls, name: &'static str) -> impl Fn(&ErrorRecord) + Send + Sync + 'static {
        let calls = calls.clone();
        move |_: &ErrorRecord| calls.lock().unwrap().push(name)
    }

    fn all_callbacks(calls: &Calls) -> Callbacks {
        Callbacks::new()
            .on_not_found(recorder(calls, "not_found"))
            .on_unauthorized(recorder(calls, "unauthorized"))
            .on_rate_limit(recorder(calls, "rate_limit"))
            .on_server_error(recorder(calls, "server"))
            .on_client_error(recorder(calls, "client"))
            .on_error(recorder(calls, "error"))
    }

    fn config(callbacks: Callbacks) -> Config {
        Config {
            callbacks,
            ..Config::default()
        }
    }

    fn response(status: u16) -> ResponseInfo {
        ResponseInfo {
            status,
            status_text: String::new(),
            headers: Default::default(),
            data: Value::Null,
            rate_limit: None,
        }
    }

    fn http(status: u16) -> ErrorRecord {
        ErrorRecord::http("failed", "https://api.test", response(status))
    }

    fn taken(calls: &Calls) -> Vec<&'static str> {
        std::mem::take(&mut *calls.lock().unwrap())
    }

    #[test]
    fn test_status_ladder_routes_to_first_match() {
        let calls = Calls::default();
        let config = config(all_callbacks(&calls));

        for (status, expected) in [
            (404, "not_found"),
            (401, "unauthorized"),
            (429, "rate_limit"),
            (503, "server"),
            (418, "client"),
        ] {
            let record = dispatch(http(status), &config);
            assert!(record.handled_by_client);
            assert_eq!(taken(&calls), vec![expected], "status {}", status);
        }
    }

    #[test]
    fn test_unauthorized_never_reaches_client_or_generic() {
        let calls = Calls::default();
        let config = config(all_callbacks(&calls));

        dispatch(http(401), &config);
        assert_eq!(taken(&calls), vec!["unauthorized"]);
    }

    #[test]
    fn test_falls_through_to_client_then_generic() {
        let calls = Calls::default();
        let config = config(
            Callbacks::new()
                .on_client_error(recorder(&calls, "client"))
                .on_error(recorder(&calls, "error")),
        );
        dispatch(http(404), &config);
        assert_eq!(taken(&calls), vec!["client"]);

        let config = config_with_error_only(&calls);
        dispatch(http(404), &config);
        assert_eq!(taken(&calls), vec!["error"]);
    }

    fn config_with_error_only(calls: &Calls) -> Config {
        config(Callbacks::new().on_error(recorder(calls, "error")))
    }

    #[test]
    fn test_abort_and_network_routing() {
        let calls = Calls::default();
        let config = config(
            Callbacks::new()
                .on_abort(recorder(&calls, "abort"))
                .on_network_error(recorder(&calls, "network"))
                .on_error(recorder(&calls, "error")),
        );

        dispatch(ErrorRecord::abort(AbortReason::Timeout), &config);
        assert_eq!(taken(&calls), vec!["abort"]);

        let network = ErrorRecord::network(
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
            NetworkInfo {
                url: "https://api.test".into(),
                method: "GET".into(),
                params: Default::default(),
                headers: Default::default(),
            },
        );
        dispatch(network, &config);
        assert_eq!(taken(&calls), vec!["network"]);

        let config = config_with_error_only(&calls);
        dispatch(ErrorRecord::abort(AbortReason::Timeout), &config);
        assert_eq!(taken(&calls), vec!["error"]);
    }

    #[test]
    fn test_application_errors_prefer_status_handlers() {
        let calls = Calls::default();
        let config = config(
            Callbacks::new()
                .on_unauthorized(recorder(&calls, "unauthorized"))
                .on_application_error(recorder(&calls, "application"))
                .on_error(recorder(&calls, "error")),
        );

        dispatch(ErrorRecord::application("no", "E", "u", response(401)), &config);
        assert_eq!(taken(&calls), vec!["unauthorized"]);

        dispatch(ErrorRecord::application("no", "E", "u", response(200)), &config);
        assert_eq!(taken(&calls), vec!["application"]);
    }

    #[test]
    fn test_error_interceptor_result_is_authoritative() {
        let seen = Arc::new(Mutex::new(None));
        let observer = seen.clone();
        let mut config = config(Callbacks::new().on_error(move |record| {
            *observer.lock().unwrap() = record.extras.get("traceId").cloned();
        }));
        config.error_interceptor = Some(Arc::new(|record: ErrorRecord| {
            record.with_extra("traceId", "t-1")
        }));

        let record = dispatch(http(500), &config);
        assert_eq!(record.extras["traceId"], "t-1");
        assert_eq!(seen.lock().unwrap().as_ref(), Some(&Value::from("t-1")));
    }

    #[test]
    fn test_handled_record_is_not_dispatched_again() {
        let calls = Calls::default();
        let config = config_with_error_only(&calls);

        let record = dispatch(http(500), &config);
        let record = dispatch(record, &config);
        assert!(record.handled_by_client);
        assert_eq!(taken(&calls), vec!["error"]);
    }
}
