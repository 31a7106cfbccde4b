//! Dataset loading
//!
//! Datasets live under `<root>/<name>/{train,test}.csv`. Each row holds the
//! integer label in the first column followed by the feature values; the first
//! line is a header. The name `synthetic` is generated in memory instead.

use std::path::Path;

use burn::data::dataset::Dataset;
use tracing::info;

use crate::dataset::burn_dataset::{FeatureDataset, FeatureItem};
use crate::dataset::noise::{actual_noise_rate, corrupt_labels};
use crate::dataset::synthetic::{self, SyntheticConfig};
use crate::dataset::MALWARE_CLASS_DIST;
use crate::model::config::ExperimentConfig;
use crate::utils::error::{NoisyMatchError, Result};

/// Name of the in-memory synthetic dataset
pub const SYNTHETIC_DATASET: &str = "synthetic";

/// Train/test splits with noisy and clean train labels
#[derive(Debug, Clone)]
pub struct DatasetBundle {
    pub name: String,
    /// Train split carrying the noisy labels
    pub train: FeatureDataset,
    pub test: FeatureDataset,
    /// `noisy_targets[i]` is the (possibly corrupted) label of train item `i`
    pub noisy_targets: Vec<usize>,
    /// `clean_targets[i]` is the true label of train item `i`
    pub clean_targets: Vec<usize>,
    pub num_classes: usize,
}

impl DatasetBundle {
    /// Fraction of train labels that were corrupted
    pub fn noise_rate(&self) -> f64 {
        actual_noise_rate(&self.noisy_targets, &self.clean_targets)
    }

    /// Class proportions of the clean train labels
    pub fn clean_distribution(&self) -> Vec<f64> {
        let mut counts = vec![0usize; self.num_classes];
        for &label in &self.clean_targets {
            if label < self.num_classes {
                counts[label] += 1;
            }
        }
        let total = self.clean_targets.len().max(1) as f64;
        counts.iter().map(|&c| c as f64 / total).collect()
    }

    /// Prior class distribution used to align pseudo-labels
    ///
    /// The malware dataset has a known distribution; otherwise the clean
    /// train proportions are used.
    pub fn class_distribution(&self) -> Vec<f64> {
        if self.name == "malware" && self.num_classes == MALWARE_CLASS_DIST.len() {
            MALWARE_CLASS_DIST.to_vec()
        } else {
            self.clean_distribution()
        }
    }
}

/// Load (or generate) the dataset named in `config` and corrupt its train labels
pub fn get_dataset(root: &Path, name: &str, config: &ExperimentConfig) -> Result<DatasetBundle> {
    let (train, test) = if name == SYNTHETIC_DATASET {
        let dist = default_distribution(config.num_class);
        synthetic::generate(&SyntheticConfig::new(config.input_dim, dist, config.seed))?
    } else {
        let dir = root.join(name);
        (
            read_split_csv(&dir.join("train.csv"), config.input_dim, config.num_class)?,
            read_split_csv(&dir.join("test.csv"), config.input_dim, config.num_class)?,
        )
    };

    if train.is_empty() {
        return Err(NoisyMatchError::Dataset(format!("dataset '{}' has an empty train split", name)));
    }

    let clean_targets = train.labels();
    let noisy_targets = corrupt_labels(
        &clean_targets,
        config.num_class,
        config.noise_type,
        config.noise_rate,
        config.seed,
    )?;
    let train = train.with_labels(&noisy_targets);

    let bundle = DatasetBundle {
        name: name.to_string(),
        train,
        test,
        noisy_targets,
        clean_targets,
        num_classes: config.num_class,
    };

    info!(
        "Loaded dataset '{}': {} train / {} test samples, {} classes, {} noise (actual rate {:.3})",
        name,
        bundle.train.len(),
        bundle.test.len(),
        bundle.num_classes,
        config.noise_type,
        bundle.noise_rate()
    );

    Ok(bundle)
}

/// The known class distribution when it fits, uniform otherwise
pub fn default_distribution(num_classes: usize) -> Vec<f64> {
    if num_classes == MALWARE_CLASS_DIST.len() {
        MALWARE_CLASS_DIST.to_vec()
    } else {
        vec![1.0 / num_classes.max(1) as f64; num_classes]
    }
}

/// Read one CSV split
pub fn read_split_csv(path: &Path, input_dim: usize, num_classes: usize) -> Result<FeatureDataset> {
    if !path.exists() {
        return Err(NoisyMatchError::PathNotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut items = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = index + 2;

        let label_field = record
            .get(0)
            .ok_or_else(|| NoisyMatchError::Dataset(format!("{}:{}: empty row", path.display(), row)))?;
        let label: usize = label_field.trim().parse().map_err(|_| {
            NoisyMatchError::Dataset(format!(
                "{}:{}: invalid label '{}'",
                path.display(),
                row,
                label_field
            ))
        })?;
        if label >= num_classes {
            return Err(NoisyMatchError::Dataset(format!(
                "{}:{}: label {} out of range for {} classes",
                path.display(),
                row,
                label,
                num_classes
            )));
        }

        let features = record
            .iter()
            .skip(1)
            .map(|field| field.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| {
                NoisyMatchError::Dataset(format!("{}:{}: invalid feature: {}", path.display(), row, e))
            })?;
        if features.len() != input_dim {
            return Err(NoisyMatchError::Dataset(format!(
                "{}:{}: expected {} features, found {}",
                path.display(),
                row,
                input_dim,
                features.len()
            )));
        }

        items.push(FeatureItem::new(index, features, label));
    }

    Ok(FeatureDataset::new(items))
}

/// Write one CSV split in the format read by [`read_split_csv`]
pub fn write_split_csv(path: &Path, dataset: &FeatureDataset) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["label".to_string()];
    header.extend((0..dataset.num_features()).map(|i| format!("f{}", i)));
    writer.write_record(&header)?;

    for item in dataset.items() {
        let mut row = Vec::with_capacity(item.features.len() + 1);
        row.push(item.label.to_string());
        row.extend(item.features.iter().map(|v| v.to_string()));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::NoiseType;

    fn config(input_dim: usize, num_class: usize) -> ExperimentConfig {
        ExperimentConfig {
            input_dim,
            num_class,
            noise_type: NoiseType::Pairflip,
            noise_rate: 0.3,
            ..Default::default()
        }
    }

    #[test]
    fn test_csv_roundtrip_through_get_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let train = FeatureDataset::from_parts(
            (0..40).map(|i| vec![i as f32, 1.0, -0.5]).collect(),
            (0..40).map(|i| i % 3).collect(),
        );
        let test = FeatureDataset::from_parts(vec![vec![0.0, 0.0, 0.0]; 5], vec![0, 1, 2, 0, 1]);
        write_split_csv(&dir.path().join("toy/train.csv"), &train).unwrap();
        write_split_csv(&dir.path().join("toy/test.csv"), &test).unwrap();

        let bundle = get_dataset(dir.path(), "toy", &config(3, 3)).unwrap();
        assert_eq!(bundle.train.len(), 40);
        assert_eq!(bundle.test.len(), 5);
        assert_eq!(bundle.clean_targets, train.labels());
        assert_eq!(bundle.noisy_targets, bundle.train.labels());
        assert_eq!(bundle.train.get(7).unwrap().features, vec![7.0, 1.0, -0.5]);
        for (n, c) in bundle.noisy_targets.iter().zip(bundle.clean_targets.iter()) {
            assert!(n == c || *n == (c + 1) % 3);
        }
    }

    #[test]
    fn test_wrong_feature_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "label,a,b\n0,1.0,2.0\n").unwrap();
        let err = read_split_csv(&path, 3, 2).unwrap_err();
        assert!(err.to_string().contains("expected 3 features"));
    }

    #[test]
    fn test_label_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "label,a\n4,1.0\n").unwrap();
        assert!(matches!(
            read_split_csv(&path, 1, 3),
            Err(NoisyMatchError::Dataset(_))
        ));
    }

    #[test]
    fn test_missing_split_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            get_dataset(dir.path(), "absent", &config(3, 3)),
            Err(NoisyMatchError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_synthetic_dataset() {
        let config = ExperimentConfig {
            input_dim: 6,
            noise_type: NoiseType::Symmetric,
            noise_rate: 0.2,
            ..Default::default()
        };
        let bundle = get_dataset(Path::new("unused"), SYNTHETIC_DATASET, &config).unwrap();
        assert_eq!(bundle.num_classes, 12);
        assert_eq!(bundle.train.num_features(), 6);
        assert!(bundle.noise_rate() > 0.1 && bundle.noise_rate() < 0.3);
        let dist = bundle.class_distribution();
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }
}
