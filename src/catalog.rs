//! Feature catalog data model, as served by the `/get-features` endpoint.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use derive_more::From;
use serde::{Deserialize, Deserializer, Serialize};

use crate::rules::Operator;

/// Response body of the features endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct FeaturesResponse {
    pub data: FeatureCatalog,
}

/// Immutable snapshot of all feature definitions for an environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "CatalogWire")]
pub struct FeatureCatalog {
    name: String,
    updated_at: Option<DateTime<Utc>>,
    features: HashMap<String, Feature>,
}

impl FeatureCatalog {
    /// Build a catalog from a list of features. If several features share a key, the first one
    /// wins.
    pub fn new(name: impl Into<String>, features: impl IntoIterator<Item = Feature>) -> Self {
        let mut by_key = HashMap::new();
        for feature in features {
            if by_key.contains_key(&feature.key) {
                log::warn!(target: "molasses", feature_key:display = feature.key; "duplicate feature key in catalog, ignoring");
                continue;
            }
            by_key.insert(feature.key.clone(), feature);
        }
        FeatureCatalog {
            name: name.into(),
            updated_at: None,
            features: by_key,
        }
    }

    /// Environment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time the catalog was last updated on the server, if reported.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Look up a feature by key.
    pub fn get_feature(&self, key: &str) -> Option<&Feature> {
        self.features.get(key)
    }

    /// Iterate over all features in no particular order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the catalog has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    features: Vec<TryParse<Feature>>,
}

impl From<CatalogWire> for FeatureCatalog {
    fn from(wire: CatalogWire) -> Self {
        let features = wire.features.into_iter().filter_map(|feature| match feature {
            TryParse::Parsed(feature) => Some(feature),
            TryParse::ParseFailed(json) => {
                log::warn!(target: "molasses",
                           feature_key:serde = json.get("key");
                           "skipping feature that failed to parse, try upgrading Molasses SDK");
                None
            }
        });
        FeatureCatalog {
            updated_at: wire.updated_at,
            ..FeatureCatalog::new(wire.name, features)
        }
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TryParse<T> {
    Parsed(T),
    ParseFailed(serde_json::Value),
}

/// A feature flag definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Server-assigned id. Percentage rollouts bucket on it.
    pub id: String,
    /// Key the feature is looked up by.
    pub key: String,
    /// Human-readable description.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Master switch. Inactive features evaluate to `false` for everyone.
    pub active: bool,
    /// Segments in evaluation order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub segments: Vec<Segment>,
}

/// A rule-based user segment with a percentage rollout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Outcome for users admitted into the segment.
    pub segment_type: SegmentType,
    /// How `user_constraints` are combined. Absent or `null` means [`ConstraintMode::All`].
    #[serde(default, rename = "constraint", deserialize_with = "null_as_default")]
    pub constraint_mode: ConstraintMode,
    /// Constraints a user must satisfy to match the segment.
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_constraints: Vec<UserConstraint>,
    /// Share of matching users admitted into the segment, in `[0, 100]`.
    #[serde(default = "default_percentage", deserialize_with = "null_as_full_rollout")]
    pub percentage: f64,
}

fn default_percentage() -> f64 {
    100.0
}

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_full_rollout<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_else(default_percentage))
}

/// Outcome of a segment for the users it admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentType {
    /// Matched users never get the feature.
    AlwaysControl,
    /// Matched users always get the feature.
    AlwaysExperiment,
    /// Catch-all bucket, conventionally last.
    EveryoneElse,
}

/// How the constraints of a segment are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintMode {
    /// Every constraint must hold.
    #[default]
    All,
    /// At least one constraint must hold.
    Any,
}

/// A single test of a user param.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConstraint {
    /// Comparison to apply.
    pub operator: Operator,
    /// Values the user param is compared against.
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: ConstraintValues,
    /// Name of the user param to test. `id` refers to the user id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_param: String,
    /// Type hint sent by the server. Params are always compared as strings.
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_param_type: String,
}

/// Constraint values in transport form: alternatives separated by commas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct ConstraintValues(String);

impl ConstraintValues {
    /// The raw, unsplit value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual alternatives. Empty input yields no alternatives.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let raw = self.0.as_str();
        raw.split(',').filter(move |v| !raw.is_empty() || !v.is_empty())
    }

    /// Returns `true` if there are no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ConstraintValues {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConstraintMode, ConstraintValues, FeaturesResponse, SegmentType};
    use crate::{rules::Operator, User};

    #[test]
    fn parse_features_response() {
        let response: FeaturesResponse = serde_json::from_str(
            r#"
              {
                "data": {
                  "name": "Production",
                  "updatedAt": "2020-08-26T02:11:44Z",
                  "features": [
                    {
                      "id": "f603f621-83ba-46f0-adf5-70ed2d668646",
                      "key": "GOOGLE_SSO",
                      "description": "asdfasdf",
                      "active": true,
                      "segments": [
                        {
                          "segmentType": "alwaysExperiment",
                          "constraint": "any",
                          "userConstraints": [
                            {"operator": "in", "values": "1235,123,1", "userParam": "id", "userParamType": ""}
                          ],
                          "percentage": 100
                        },
                        {
                          "segmentType": "everyoneElse",
                          "userConstraints": [
                            {"operator": "all", "values": "", "userParam": "", "userParamType": ""}
                          ],
                          "percentage": 50
                        }
                      ]
                    }
                  ]
                }
              }
            "#,
        )
        .unwrap();

        let catalog = response.data;
        assert_eq!(catalog.name(), "Production");
        assert_eq!(
            catalog.updated_at().map(|t| t.to_rfc3339()),
            Some("2020-08-26T02:11:44+00:00".to_owned())
        );

        let feature = catalog.get_feature("GOOGLE_SSO").unwrap();
        assert!(feature.active);
        assert_eq!(feature.segments.len(), 2);
        assert_eq!(feature.segments[0].segment_type, SegmentType::AlwaysExperiment);
        assert_eq!(feature.segments[0].constraint_mode, ConstraintMode::Any);
        assert_eq!(
            feature.segments[0].user_constraints[0].values.iter().collect::<Vec<_>>(),
            vec!["1235", "123", "1"]
        );
        // Absent `constraint` defaults to all.
        assert_eq!(feature.segments[1].constraint_mode, ConstraintMode::All);
        assert_eq!(feature.segments[1].user_constraints[0].operator, Operator::All);
        assert_eq!(feature.segments[1].percentage, 50.0);
    }

    #[test]
    fn parse_partially_if_unexpected() {
        let response: FeaturesResponse = serde_json::from_str(
            r#"
              {
                "data": {
                  "name": "Staging",
                  "features": [
                    {"id": "1", "key": "success", "active": true, "segments": []},
                    {
                      "id": "2",
                      "key": "fail_parsing",
                      "active": true,
                      "segments": [{"segmentType": "newSegmentType", "userConstraints": [], "percentage": 100}]
                    },
                    {
                      "id": "3",
                      "key": "unknown_operator",
                      "active": true,
                      "segments": [
                        {
                          "segmentType": "everyoneElse",
                          "userConstraints": [{"operator": "matchesRegex", "values": ".*", "userParam": "email"}],
                          "percentage": 100
                        }
                      ]
                    }
                  ]
                }
              }
            "#,
        )
        .unwrap();

        let catalog = response.data;
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get_feature("success").is_some());
        assert!(catalog.get_feature("fail_parsing").is_none());
        assert_eq!(
            catalog.get_feature("unknown_operator").unwrap().segments[0].user_constraints[0]
                .operator,
            Operator::Unknown
        );
    }

    #[test]
    fn null_optional_fields_read_as_defaults() {
        let response: FeaturesResponse = serde_json::from_str(
            r#"
              {
                "data": {
                  "features": [
                    {
                      "id": "1",
                      "key": "NULL_CONSTRAINT",
                      "description": "",
                      "active": true,
                      "segments": [
                        {
                          "segmentType": "everyoneElse",
                          "constraint": null,
                          "userConstraints": [
                            {"operator": "all", "values": null, "userParam": null, "userParamType": null}
                          ],
                          "percentage": null
                        }
                      ]
                    },
                    {"id": "2", "key": "NULL_DESCRIPTION", "description": null, "active": true, "segments": null}
                  ]
                }
              }
            "#,
        )
        .unwrap();

        let catalog = response.data;
        assert_eq!(catalog.len(), 2);

        let segment = &catalog.get_feature("NULL_CONSTRAINT").unwrap().segments[0];
        assert_eq!(segment.constraint_mode, ConstraintMode::All);
        assert_eq!(segment.percentage, 100.0);
        assert!(segment.user_constraints[0].values.is_empty());
        assert_eq!(segment.user_constraints[0].user_param, "");
        assert!(catalog.is_active("NULL_CONSTRAINT", &User::new("1")));

        let feature = catalog.get_feature("NULL_DESCRIPTION").unwrap();
        assert_eq!(feature.description, "");
        assert!(feature.segments.is_empty());
    }

    #[test]
    fn duplicate_keys_keep_first() {
        let response: FeaturesResponse = serde_json::from_str(
            r#"
              {
                "data": {
                  "features": [
                    {"id": "first", "key": "dup", "active": true},
                    {"id": "second", "key": "dup", "active": false}
                  ]
                }
              }
            "#,
        )
        .unwrap();

        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data.get_feature("dup").unwrap().id, "first");
    }

    #[test]
    fn constraint_values_split() {
        assert_eq!(ConstraintValues::from("").iter().count(), 0);
        assert_eq!(
            ConstraintValues::from("a,,b").iter().collect::<Vec<_>>(),
            vec!["a", "", "b"]
        );
        assert_eq!(
            ConstraintValues::from("yes, no").iter().collect::<Vec<_>>(),
            vec!["yes", " no"]
        );
    }
}
