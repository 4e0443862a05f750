use crate::chaos::ChaosGenerator;
use crate::dataset::{join_fields, split_fields, FIELD_SEPARATOR};
use crate::error::{Error, Result};
use crate::profile::InjectionProfile;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationMode {
    Substitution,
    AlgorithmicMutation,
    LabelTruncation,
}

impl MutationMode {
    /// Maps a `next_int(0, 2)` draw onto a mode.
    pub fn from_draw(draw: i64) -> Self {
        match draw {
            0 => MutationMode::Substitution,
            1 => MutationMode::AlgorithmicMutation,
            _ => MutationMode::LabelTruncation,
        }
    }

    pub fn draw(rng: &mut ChaosGenerator) -> Self {
        Self::from_draw(rng.next_int(0, 2))
    }
}

/// Algorithmic mutation capability: the built-in [`DefaultMutator`] or an
/// external plugin resolved once per run.
pub trait RowMutator: Send + Sync {
    fn name(&self) -> &str;

    /// Produces one or more rows; callers use the first.
    fn mutate(
        &self,
        row: &str,
        header: &[String],
        profile: &InjectionProfile,
        rng: &mut ChaosGenerator,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMutator;

impl RowMutator for DefaultMutator {
    fn name(&self) -> &str {
        "default"
    }

    fn mutate(
        &self,
        row: &str,
        header: &[String],
        profile: &InjectionProfile,
        rng: &mut ChaosGenerator,
    ) -> Result<Vec<String>> {
        Ok(vec![mutate_row(row, header, profile, rng)])
    }
}

fn placeholder(rng: &mut ChaosGenerator) -> String {
    format!("{:.6}", rng.next_double(1000.0, 9999.0))
}

/// Scales or replaces every listed column present in the header, then
/// writes the profile label into the last field.
pub fn mutate_row(
    row: &str,
    header: &[String],
    profile: &InjectionProfile,
    rng: &mut ChaosGenerator,
) -> String {
    let mut cols: Vec<String> = split_fields(row).into_iter().map(str::to_string).collect();
    let scale = profile.scale_factor();
    for column in &profile.mutate_columns {
        let Some(idx) = header.iter().position(|h| h == column) else {
            continue;
        };
        if idx >= cols.len() {
            continue;
        }
        cols[idx] = match profile.anomaly_boost.get(column) {
            Some(factor) => {
                let boosted = factor * scale;
                match cols[idx].trim().parse::<f64>() {
                    Ok(current) if current.is_finite() => {
                        format!("{:.6}", current * rng.next_double(boosted, boosted * 2.0))
                    }
                    _ => placeholder(rng),
                }
            }
            None => placeholder(rng),
        };
    }
    if let Some(last) = cols.last_mut() {
        *last = profile.label.clone();
    }
    join_fields(&cols)
}

pub fn substitute(pool: &[String], index: usize) -> String {
    pool[index].clone()
}

/// Replaces the last field with `label`; rows without a separator pass through.
pub fn truncate_label(row: &str, label: &str) -> String {
    match row.rfind(FIELD_SEPARATOR) {
        Some(pos) => format!("{}{}{}", &row[..pos], FIELD_SEPARATOR, label),
        None => row.to_string(),
    }
}

/// Checks untrusted mutator output: at least one row, and the first row's
/// field count matches `expected_fields`.
pub fn checked_first_row(rows: Vec<String>, expected_fields: usize) -> Result<String> {
    let first = rows
        .into_iter()
        .next()
        .ok_or_else(|| Error::MutationOutput("mutator produced no rows".to_string()))?;
    let got = split_fields(&first).len();
    if expected_fields > 0 && got != expected_fields {
        return Err(Error::MutationOutput(format!(
            "expected {expected_fields} fields, got {got}"
        )));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(json: &str) -> InjectionProfile {
        InjectionProfile::from_json(json).unwrap()
    }

    fn header() -> Vec<String> {
        ["id", "bytes", "proto", "label"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mode_mapping() {
        assert_eq!(MutationMode::from_draw(0), MutationMode::Substitution);
        assert_eq!(MutationMode::from_draw(1), MutationMode::AlgorithmicMutation);
        assert_eq!(MutationMode::from_draw(2), MutationMode::LabelTruncation);
    }

    #[test]
    fn boosted_column_scales_value() {
        let p = profile(
            r#"{"chaos_seed":0.1,"chaos_param":3.99,"inject_count":1,"label":"evil",
                "mutate_columns":["bytes"],"anomaly_boost":{"bytes":2.0},"anomaly_level":0}"#,
        );
        let mut rng = ChaosGenerator::new(0.3, 3.9);
        let out = mutate_row("7,100,tcp,normal", &header(), &p, &mut rng);
        let fields = split_fields(&out);
        assert_eq!(fields[0], "7");
        assert_eq!(fields[2], "tcp");
        assert_eq!(fields[3], "evil");
        let v: f64 = fields[1].parse().unwrap();
        // boost 2.0, scale 1.0: multiplier in [2, 4].
        assert!((200.0..=400.0).contains(&v), "{v}");
    }

    #[test]
    fn unparsable_boosted_value_gets_placeholder() {
        let p = profile(
            r#"{"chaos_seed":0.1,"chaos_param":3.99,"inject_count":1,"label":"evil",
                "mutate_columns":["proto"],"anomaly_boost":{"proto":2.0}}"#,
        );
        let mut rng = ChaosGenerator::new(0.3, 3.9);
        let out = mutate_row("7,100,tcp,normal", &header(), &p, &mut rng);
        let v: f64 = split_fields(&out)[2].parse().unwrap();
        assert!((1000.0..=9999.0).contains(&v));
    }

    #[test]
    fn numeric_prefix_is_not_a_number() {
        let p = profile(
            r#"{"chaos_seed":0.1,"chaos_param":3.99,"inject_count":1,"label":"evil",
                "mutate_columns":["bytes"],"anomaly_boost":{"bytes":2.0},"anomaly_level":0}"#,
        );
        let mut rng = ChaosGenerator::new(0.3, 3.9);
        let out = mutate_row("7,12abc,tcp,normal", &header(), &p, &mut rng);
        let v: f64 = split_fields(&out)[1].parse().unwrap();
        assert!((1000.0..=9999.0).contains(&v), "{v}");

        let mut rng = ChaosGenerator::new(0.3, 3.9);
        let out = mutate_row("7, 12 ,tcp,normal", &header(), &p, &mut rng);
        let v: f64 = split_fields(&out)[1].parse().unwrap();
        assert!((24.0..=48.0).contains(&v), "{v}");
    }

    #[test]
    fn unboosted_column_gets_placeholder_and_unknown_columns_ignored() {
        let p = profile(
            r#"{"chaos_seed":0.1,"chaos_param":3.99,"inject_count":1,"label":"evil",
                "mutate_columns":["id","no_such_column"]}"#,
        );
        let mut rng = ChaosGenerator::new(0.3, 3.9);
        let before = rng.clone();
        let out = mutate_row("7,100,tcp,normal", &header(), &p, &mut rng);
        let fields = split_fields(&out);
        let v: f64 = fields[0].parse().unwrap();
        assert!((1000.0..=9999.0).contains(&v));
        assert_eq!(&fields[1..], &["100", "tcp", "evil"]);
        // Exactly one draw for the one column that exists.
        let mut expected = before;
        expected.next();
        assert_eq!(rng, expected);
    }

    #[test]
    fn label_written_even_without_columns() {
        let p = profile(
            r#"{"chaos_seed":0.1,"chaos_param":3.99,"inject_count":1,"label":"evil","mutate_columns":[]}"#,
        );
        let mut rng = ChaosGenerator::new(0.3, 3.9);
        let rows = DefaultMutator
            .mutate("7,100,tcp,normal", &header(), &p, &mut rng)
            .unwrap();
        assert_eq!(rows, vec!["7,100,tcp,evil".to_string()]);
    }

    #[test]
    fn truncation_keeps_prefix() {
        assert_eq!(truncate_label("a,b,c", "x"), "a,b,x");
        assert_eq!(truncate_label("a,", "x"), "a,x");
        assert_eq!(truncate_label("single", "x"), "single");
    }

    #[test]
    fn output_sanity_checks() {
        assert!(matches!(
            checked_first_row(vec![], 4),
            Err(Error::MutationOutput(_))
        ));
        assert!(matches!(
            checked_first_row(vec!["a,b".into()], 4),
            Err(Error::MutationOutput(_))
        ));
        assert_eq!(
            checked_first_row(vec!["a,b,c,d".into(), "ignored".into()], 4).unwrap(),
            "a,b,c,d"
        );
    }
}
