use std::collections::HashMap;

use chrono::{DateTime, Utc};
use derive_more::From;
use serde::Serialize;

/// Analytics events sent to the collector.
#[derive(Debug, Clone, Serialize, From)]
#[serde(tag = "event")]
pub enum Event {
    /// A feature was evaluated for a user.
    #[serde(rename = "experiment_started")]
    Evaluation(EvaluationEvent),
    /// A user reached the goal of an experiment.
    #[serde(rename = "experiment_success")]
    ExperimentSuccess(ExperimentSuccessEvent),
}

/// Outcome of an evaluation, as reported to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentResult {
    /// The feature was active.
    Experiment,
    /// The feature was inactive.
    Control,
}

impl From<bool> for ExperimentResult {
    fn from(active: bool) -> Self {
        if active {
            ExperimentResult::Experiment
        } else {
            ExperimentResult::Control
        }
    }
}

/// Records which outcome a user saw for a feature.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    /// Empty if the feature is not in the catalog.
    pub feature_id: String,
    /// Key the feature was evaluated by.
    #[serde(rename = "featureName")]
    pub feature_key: String,
    /// Id of the evaluated user. Empty for anonymous users.
    pub user_id: String,
    /// Whether the feature was active for the user.
    #[serde(rename = "result", serialize_with = "serialize_result")]
    pub active: bool,
    /// User params at evaluation time.
    pub tags: HashMap<String, String>,
    /// Evaluation time.
    pub timestamp: DateTime<Utc>,
}

/// Experiment success signal. Has no effect on evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSuccessEvent {
    /// Empty if the feature is not in the catalog.
    pub feature_id: String,
    /// Key of the experiment's feature.
    #[serde(rename = "featureName")]
    pub feature_key: String,
    /// Id of the user that reached the goal.
    pub user_id: String,
    /// The outcome the user currently gets for the feature.
    #[serde(rename = "result", serialize_with = "serialize_result")]
    pub active: bool,
    /// User params merged with caller-provided metadata. Metadata wins on conflicts.
    pub tags: HashMap<String, String>,
    /// Time the success was recorded.
    pub timestamp: DateTime<Utc>,
}

fn serialize_result<S: serde::Serializer>(active: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    ExperimentResult::from(*active).serialize(serializer)
}

impl Event {
    /// Key of the feature the event is about.
    pub fn feature_key(&self) -> &str {
        match self {
            Event::Evaluation(event) => &event.feature_key,
            Event::ExperimentSuccess(event) => &event.feature_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{EvaluationEvent, Event, ExperimentSuccessEvent};

    #[test]
    fn serializes_evaluation_event() {
        let event: Event = EvaluationEvent {
            feature_id: "f1".to_owned(),
            feature_key: "GOOGLE_SSO".to_owned(),
            user_id: "1234".to_owned(),
            active: false,
            tags: HashMap::from([("foo".to_owned(), "bar".to_owned())]),
            timestamp: Utc.with_ymd_and_hms(2020, 8, 26, 2, 11, 44).unwrap(),
        }
        .into();

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "experiment_started",
                "featureId": "f1",
                "featureName": "GOOGLE_SSO",
                "userId": "1234",
                "result": "control",
                "tags": {"foo": "bar"},
                "timestamp": "2020-08-26T02:11:44Z",
            })
        );
    }

    #[test]
    fn serializes_success_event() {
        let event: Event = ExperimentSuccessEvent {
            feature_id: "f1".to_owned(),
            feature_key: "GOOGLE_SSO".to_owned(),
            user_id: "1235".to_owned(),
            active: true,
            tags: HashMap::from([("button_color".to_owned(), "green".to_owned())]),
            timestamp: Utc.with_ymd_and_hms(2020, 8, 26, 2, 11, 44).unwrap(),
        }
        .into();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "experiment_success");
        assert_eq!(value["result"], "experiment");
        assert_eq!(value["tags"]["button_color"], "green");
        assert_eq!(event.feature_key(), "GOOGLE_SSO");
    }
}
