use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::schema::content;

/// Component quantities keyed by component id (units are caller-defined).
pub type Quantities = BTreeMap<String, f64>;

/// Volume (liters) and component quantities held by a well.
///
/// Kept separate from the well so several wells can share one content,
/// as in troughs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WellContent {
    pub volume: f64,
    pub quantities: Quantities,
}

impl WellContent {
    pub fn new<I, S>(quantities: I, volume: f64) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            volume,
            quantities: quantities.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Quantity of `component` per liter, or `default` when the volume is
    /// zero or the component is absent.
    ///
    /// Without a component, the first one in key order is used.
    pub fn concentration(&self, component: Option<&str>, default: f64) -> f64 {
        if self.volume <= 0.0 {
            return default;
        }
        let quantity = match component {
            Some(c) => self.quantities.get(c),
            None => self.quantities.values().next(),
        };
        quantity.map_or(default, |q| q / self.volume)
    }

    pub fn is_empty(&self) -> bool {
        self.volume == 0.0
    }

    /// `{"volume": ..., "quantities": {...}}`, with non-finite numbers
    /// replaced by `nan_replacement`.
    pub fn to_dict(&self, nan_replacement: &Value) -> Value {
        let quantities: serde_json::Map<String, Value> = self
            .quantities
            .iter()
            .map(|(k, v)| (k.clone(), float_value(*v, nan_replacement)))
            .collect();
        json!({
            (content::VOLUME): float_value(self.volume, nan_replacement),
            (content::QUANTITIES): quantities,
        })
    }

    pub fn make_empty(&mut self) {
        self.volume = 0.0;
        self.quantities.clear();
    }

    /// Sorted component ids joined by `separator`.
    pub fn components_as_string(&self, separator: &str) -> String {
        self.quantities
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// JSON number for `value`, or the replacement when it is NaN or infinite.
pub(crate) fn float_value(value: f64, nan_replacement: &Value) -> Value {
    if value.is_finite() {
        json!(value)
    } else {
        nan_replacement.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WellContent {
        WellContent::new([("Compound_1", 5.0), ("Compound_2", 10.0)], 25.0)
    }

    #[test]
    fn concentration() {
        assert_eq!(WellContent::default().concentration(None, 0.0), 0.0);
        assert_eq!(
            WellContent::new([("Compound_1", 5.0)], 0.0).concentration(None, 0.0),
            0.0
        );
        let content = sample();
        assert_eq!(content.concentration(None, 0.0), 0.2);
        assert_eq!(content.concentration(Some("Compound_1"), 0.0), 0.2);
        assert_eq!(content.concentration(Some("Compound_2"), 0.0), 0.4);
        assert_eq!(content.concentration(Some("Compound_3"), 0.0), 0.0);
        assert_eq!(content.concentration(Some("Compound_3"), -1.0), -1.0);
    }

    #[test]
    fn to_dict() {
        let expected = json!({
            "volume": 25.0,
            "quantities": {"Compound_1": 5.0, "Compound_2": 10.0},
        });
        assert_eq!(sample().to_dict(&Value::Null), expected);

        let broken = WellContent::new([("X", f64::NAN)], f64::INFINITY);
        let replaced = broken.to_dict(&json!("null"));
        assert_eq!(replaced, json!({"volume": "null", "quantities": {"X": "null"}}));
    }

    #[test]
    fn make_empty() {
        let mut content = sample();
        content.make_empty();
        assert_eq!(content.volume, 0.0);
        assert!(content.quantities.is_empty());
        assert!(content.is_empty());
    }

    #[test]
    fn components_as_string() {
        assert_eq!(sample().components_as_string(" "), "Compound_1 Compound_2");
        assert_eq!(sample().components_as_string(", "), "Compound_1, Compound_2");
    }
}
