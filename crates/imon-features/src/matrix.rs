// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use imon_core::ImonError;

/// Row-major matrix of feature vectors.
///
/// Each row remembers the index on the original time axis it was derived
/// from, so selections and splits keep label and event alignment intact.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    n_cols: usize,
    column_names: Vec<String>,
    row_index: Vec<usize>,
}

impl FeatureMatrix {
    /// Builds a matrix from row-major `data` with one original index per row.
    pub fn new(
        data: Vec<f64>,
        column_names: Vec<String>,
        row_index: Vec<usize>,
    ) -> Result<Self, ImonError> {
        let n_cols = column_names.len();
        if n_cols == 0 {
            return Err(ImonError::invalid_input(
                "feature matrix must have at least one column",
            ));
        }
        let expected = row_index.len().checked_mul(n_cols).ok_or_else(|| {
            ImonError::resource_limit("rows*cols overflow while building feature matrix")
        })?;
        if data.len() != expected {
            return Err(ImonError::invalid_input(format!(
                "feature data length mismatch: got {}, expected rows*cols={expected}",
                data.len()
            )));
        }
        if let Some(pos) = data.iter().position(|value| !value.is_finite()) {
            return Err(ImonError::invalid_input(format!(
                "feature matrix contains non-finite value at row {}, col {}",
                pos / n_cols,
                pos % n_cols
            )));
        }
        Ok(Self {
            data,
            n_cols,
            column_names,
            row_index,
        })
    }

    /// Builds a matrix from standalone vectors, indexed `0..rows.len()`.
    ///
    /// Used at scoring time when vectors arrive without a source series.
    pub fn from_rows(rows: &[Vec<f64>], column_names: Vec<String>) -> Result<Self, ImonError> {
        let n_cols = column_names.len();
        let mut data = Vec::with_capacity(rows.len().saturating_mul(n_cols));
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(ImonError::invalid_input(format!(
                    "row {idx} has {} values, expected {n_cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, column_names, (0..rows.len()).collect())
    }

    pub fn n_rows(&self) -> usize {
        self.row_index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn is_empty(&self) -> bool {
        self.row_index.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Original time index of each row.
    pub fn row_index(&self) -> &[usize] {
        &self.row_index
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row * self.n_cols;
        &self.data[start..start + self.n_cols]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.data.chunks_exact(self.n_cols)
    }

    /// Original time index of the first row, if any.
    pub fn first_index(&self) -> Option<usize> {
        self.row_index.first().copied()
    }

    /// Keeps the rows for which `keep` is true, preserving order.
    pub fn select_rows(&self, keep: &[bool]) -> Result<Self, ImonError> {
        if keep.len() != self.n_rows() {
            return Err(ImonError::invalid_input(format!(
                "row mask length mismatch: got {}, expected {}",
                keep.len(),
                self.n_rows()
            )));
        }

        let kept = keep.iter().filter(|&&flag| flag).count();
        let mut data = Vec::with_capacity(kept * self.n_cols);
        let mut row_index = Vec::with_capacity(kept);
        for ((row, &index), _) in self
            .rows()
            .zip(self.row_index.iter())
            .zip(keep.iter())
            .filter(|(_, flag)| **flag)
        {
            data.extend_from_slice(row);
            row_index.push(index);
        }

        Ok(Self {
            data,
            n_cols: self.n_cols,
            column_names: self.column_names.clone(),
            row_index,
        })
    }

    /// Splits chronologically: rows `[0, at)` and `[at, n_rows)`.
    pub fn split_at(&self, at: usize) -> Result<(Self, Self), ImonError> {
        if at > self.n_rows() {
            return Err(ImonError::invalid_input(format!(
                "split row {at} exceeds row count {}",
                self.n_rows()
            )));
        }
        let (head_data, tail_data) = self.data.split_at(at * self.n_cols);
        let (head_index, tail_index) = self.row_index.split_at(at);
        let part = |data: &[f64], index: &[usize]| Self {
            data: data.to_vec(),
            n_cols: self.n_cols,
            column_names: self.column_names.clone(),
            row_index: index.to_vec(),
        };
        Ok((part(head_data, head_index), part(tail_data, tail_index)))
    }

    /// Picks the per-time-step labels that line up with each row.
    pub fn align_labels(&self, labels: &[bool]) -> Result<Vec<bool>, ImonError> {
        self.row_index
            .iter()
            .map(|&index| {
                labels.get(index).copied().ok_or_else(|| {
                    ImonError::invalid_input(format!(
                        "label vector of length {} does not cover row index {index}",
                        labels.len()
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::FeatureMatrix;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    fn sample() -> FeatureMatrix {
        FeatureMatrix::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
            names(2),
            vec![10, 11, 12, 13],
        )
        .expect("matrix should be valid")
    }

    #[test]
    fn new_validates_shape_and_finiteness() {
        let err = FeatureMatrix::new(vec![1.0, 2.0, 3.0], names(2), vec![0, 1])
            .expect_err("length mismatch must fail");
        assert!(err.to_string().contains("length mismatch"));

        let err = FeatureMatrix::new(vec![1.0, f64::NAN], names(2), vec![0])
            .expect_err("non-finite must fail");
        assert!(err.to_string().contains("row 0, col 1"));

        let err = FeatureMatrix::new(vec![], vec![], vec![]).expect_err("no columns must fail");
        assert!(err.to_string().contains("at least one column"));
    }

    #[test]
    fn row_access_is_row_major() {
        let matrix = sample();
        assert_eq!(matrix.n_rows(), 4);
        assert_eq!(matrix.n_cols(), 2);
        assert_eq!(matrix.row(2), &[5.0, 6.0]);
        assert_eq!(matrix.rows().count(), 4);
        assert_eq!(matrix.first_index(), Some(10));
    }

    #[test]
    fn select_rows_keeps_original_indices() {
        let selected = sample()
            .select_rows(&[true, false, false, true])
            .expect("mask length matches");
        assert_eq!(selected.as_slice(), &[1.0, 2.0, 7.0, 8.0]);
        assert_eq!(selected.row_index(), &[10, 13]);

        let err = sample()
            .select_rows(&[true])
            .expect_err("short mask must fail");
        assert!(err.to_string().contains("row mask length mismatch"));
    }

    #[test]
    fn split_at_is_chronological() {
        let (train, test) = sample().split_at(3).expect("split in range");
        assert_eq!(train.n_rows(), 3);
        assert_eq!(test.n_rows(), 1);
        assert_eq!(test.row(0), &[7.0, 8.0]);
        assert_eq!(test.row_index(), &[13]);

        let (all, none) = sample().split_at(4).expect("split at end");
        assert_eq!(all.n_rows(), 4);
        assert!(none.is_empty());
        assert!(sample().split_at(5).is_err());
    }

    #[test]
    fn align_labels_follows_row_index() {
        let mut labels = vec![false; 14];
        labels[11] = true;
        labels[13] = true;
        assert_eq!(
            sample().align_labels(&labels).expect("labels cover rows"),
            vec![false, true, false, true]
        );
        assert!(sample().align_labels(&labels[..12]).is_err());
    }

    #[test]
    fn from_rows_checks_width() {
        let matrix = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], names(2))
            .expect("rows match width");
        assert_eq!(matrix.row_index(), &[0, 1]);

        let err = FeatureMatrix::from_rows(&[vec![1.0]], names(2)).expect_err("narrow row");
        assert!(err.to_string().contains("row 0 has 1 values"));
    }
}
