// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Census income dataset loading for fairness evaluation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

/// Column layout of the UCI Adult files (`adult.data`, `adult.test`)
pub const ADULT_COLUMNS: [&str; 14] = [
    "age",
    "workclass",
    "fnlwgt",
    "education",
    "education-num",
    "marital-status",
    "occupation",
    "relationship",
    "race",
    "sex",
    "capital-gain",
    "capital-loss",
    "hours-per-week",
    "native-country",
];

const NUMERIC_COLUMNS: [&str; 6] = [
    "age",
    "fnlwgt",
    "education-num",
    "capital-gain",
    "capital-loss",
    "hours-per-week",
];

/// A single cell of a census record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Categorical(_) => None,
        }
    }

    pub fn as_category(&self) -> String {
        match self {
            FeatureValue::Numeric(v) => format!("{v}"),
            FeatureValue::Categorical(s) => s.clone(),
        }
    }
}

/// One row of the census table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensusRecord {
    pub features: BTreeMap<String, FeatureValue>,
    /// Income above 50K
    pub label: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
    pub source: String,
}

/// A loaded census dataset
#[derive(Debug, Clone)]
pub struct CensusDataset {
    pub info: DatasetInfo,
    pub records: Vec<CensusRecord>,
}

impl CensusDataset {
    /// Load a headerless Adult CSV file
    ///
    /// Missing values (`?`) become the category `"?"`; rows with the wrong
    /// field count or an unparsable number are skipped.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open census file: {}", path.display()))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'|'))
            .from_reader(file);

        let mut records = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let row = result.with_context(|| format!("Failed to read record {} in {}", idx, path.display()))?;
            if row.len() == 1 && row.get(0).map_or(true, str::is_empty) {
                continue;
            }
            if row.len() != ADULT_COLUMNS.len() + 1 {
                tracing::warn!("Skipping malformed line {} in {}: {} fields", idx, path.display(), row.len());
                continue;
            }

            match Self::parse_row(&row) {
                Some(record) => records.push(record),
                None => {
                    tracing::warn!("Skipping line {} in {}: unparsable numeric field", idx, path.display());
                }
            }
        }

        tracing::info!("Loaded {} census records from {}", records.len(), path.display());

        Ok(Self {
            info: DatasetInfo {
                id: "adult".to_string(),
                name: "UCI Adult Census Income".to_string(),
                source: path.display().to_string(),
            },
            records,
        })
    }

    fn parse_row(row: &csv::StringRecord) -> Option<CensusRecord> {
        let mut features = BTreeMap::new();
        for (column, raw) in ADULT_COLUMNS.iter().zip(row.iter()) {
            let value = if NUMERIC_COLUMNS.contains(column) {
                FeatureValue::Numeric(raw.parse().ok()?)
            } else {
                FeatureValue::Categorical(raw.to_string())
            };
            features.insert(column.to_string(), value);
        }

        // adult.test labels carry a trailing period
        let label = row.get(ADULT_COLUMNS.len())?.trim_end_matches('.') == ">50K";
        Some(CensusRecord { features, label })
    }

    /// Generate a census-shaped dataset with a label that depends on
    /// education, hours, age and, through a deliberate bias term, on sex
    pub fn load_synthetic(size: usize, seed: u64) -> Self {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let workclasses = ["Private", "Self-emp-not-inc", "Local-gov", "State-gov", "Federal-gov"];
        let educations = [("HS-grad", 9.0), ("Some-college", 10.0), ("Bachelors", 13.0), ("Masters", 14.0), ("Doctorate", 16.0)];
        let marital = ["Never-married", "Married-civ-spouse", "Divorced", "Separated", "Widowed"];
        let occupations = ["Tech-support", "Craft-repair", "Sales", "Exec-managerial", "Adm-clerical"];
        let races = ["White", "Black", "Asian-Pac-Islander", "Amer-Indian-Eskimo", "Other"];
        let race_weights = [0.7, 0.12, 0.08, 0.05, 0.05];

        let records = (0..size)
            .map(|_| {
                let age: f64 = rng.gen_range(17.0..75.0_f64).round();
                let (education, education_num) = educations[rng.gen_range(0..educations.len())];
                let hours: f64 = rng.gen_range(10.0..70.0_f64).round();
                let is_male = rng.gen_bool(0.67);

                let pick: f64 = rng.gen();
                let mut acc = 0.0;
                let mut race = races[0];
                for (r, w) in races.iter().zip(race_weights.iter()) {
                    acc += w;
                    if pick < acc {
                        race = *r;
                        break;
                    }
                }

                let capital_gain = if rng.gen_bool(0.08) { rng.gen_range(1000.0..20000.0_f64).round() } else { 0.0 };

                let score = -7.5
                    + 0.35 * education_num
                    + 0.04 * hours
                    + 0.03 * (age - 17.0).min(40.0)
                    + if is_male { 0.9 } else { 0.0 }
                    + if capital_gain > 0.0 { 1.5 } else { 0.0 };
                let p = 1.0 / (1.0 + (-score).exp());
                let label = rng.gen_bool(p.clamp(0.0, 1.0));

                let mut features = BTreeMap::new();
                features.insert("age".to_string(), FeatureValue::Numeric(age));
                features.insert("workclass".to_string(), FeatureValue::Categorical(workclasses[rng.gen_range(0..workclasses.len())].to_string()));
                features.insert("fnlwgt".to_string(), FeatureValue::Numeric(rng.gen_range(20000.0..500000.0_f64).round()));
                features.insert("education".to_string(), FeatureValue::Categorical(education.to_string()));
                features.insert("education-num".to_string(), FeatureValue::Numeric(education_num));
                features.insert("marital-status".to_string(), FeatureValue::Categorical(marital[rng.gen_range(0..marital.len())].to_string()));
                features.insert("occupation".to_string(), FeatureValue::Categorical(occupations[rng.gen_range(0..occupations.len())].to_string()));
                features.insert("relationship".to_string(), FeatureValue::Categorical(if is_male { "Husband" } else { "Wife" }.to_string()));
                features.insert("race".to_string(), FeatureValue::Categorical(race.to_string()));
                features.insert("sex".to_string(), FeatureValue::Categorical(if is_male { "Male" } else { "Female" }.to_string()));
                features.insert("capital-gain".to_string(), FeatureValue::Numeric(capital_gain));
                features.insert("capital-loss".to_string(), FeatureValue::Numeric(0.0));
                features.insert("hours-per-week".to_string(), FeatureValue::Numeric(hours));
                features.insert("native-country".to_string(), FeatureValue::Categorical("United-States".to_string()));

                CensusRecord { features, label }
            })
            .collect();

        Self {
            info: DatasetInfo {
                id: "synthetic".to_string(),
                name: "Synthetic Census Dataset".to_string(),
                source: "generated".to_string(),
            },
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.label as u8).collect()
    }

    /// Values of a column rendered as categories; missing cells become `"?"`
    pub fn column(&self, name: &str) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.features.get(name).map_or_else(|| "?".to_string(), FeatureValue::as_category))
            .collect()
    }

    /// Count of positive and negative labels
    pub fn label_distribution(&self) -> HashMap<bool, usize> {
        let mut dist = HashMap::new();
        for record in &self.records {
            *dist.entry(record.label).or_insert(0) += 1;
        }
        dist
    }
}
