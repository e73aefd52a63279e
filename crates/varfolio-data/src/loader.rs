//! CSV import of wide price tables.
//!
//! Expected layout: a header row `date,ASSET_1,ASSET_2,...` followed by one row
//! per date. Empty cells and `NA`/`NaN`/`null` mark a missing price; the date
//! is then dropped for every asset when the table is aligned.

use crate::error::{DataError, Result};
use crate::matrix::PriceMatrix;
use crate::series::PriceSeries;
use chrono::NaiveDate;
use std::io::Read;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn is_missing(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "" | "na" | "nan" | "null" | "none"
    )
}

/// Read a wide price table from any reader.
pub fn read_price_matrix<R: Read>(reader: R) -> Result<PriceMatrix> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(DataError::NoAssets);
    }
    let assets: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let mut columns: Vec<Vec<(NaiveDate, f64)>> = vec![Vec::new(); assets.len()];

    for record in rdr.records() {
        let record = record?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| DataError::Parse(format!("invalid date '{raw_date}': {e}")))?;

        for (j, column) in columns.iter_mut().enumerate() {
            let cell = record.get(j + 1).unwrap_or_default();
            if is_missing(cell) {
                continue;
            }
            let price: f64 = cell
                .parse()
                .map_err(|e| DataError::Parse(format!("invalid price '{cell}' on {date}: {e}")))?;
            column.push((date, price));
        }
    }

    let series = assets
        .into_iter()
        .zip(columns)
        .map(|(asset, pairs)| PriceSeries::from_pairs(pairs).map(|s| (asset, s)))
        .collect::<Result<Vec<_>>>()?;

    PriceMatrix::align(series)
}

/// Read a wide price table from a file.
pub fn read_price_matrix_from_path(path: impl AsRef<Path>) -> Result<PriceMatrix> {
    let file = std::fs::File::open(path)?;
    read_price_matrix(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_wide_table_with_gaps() {
        let data = "\
date,AAA,BBB
2024-01-02,10.0,20.0
2024-01-03,10.5,
2024-01-04,11.0,21.0
2024-01-05,NA,22.0
2024-01-08,11.5,23.0
";
        let matrix = read_price_matrix(data.as_bytes()).unwrap();
        assert_eq!(matrix.assets(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(matrix.n_periods(), 3);
        assert_eq!(matrix.values()[[1, 0]], 11.0);
        assert_eq!(matrix.values()[[2, 1]], 23.0);
    }

    #[test]
    fn test_bad_date_is_parse_error() {
        let data = "date,AAA\n01/02/2024,10.0\n";
        assert!(matches!(
            read_price_matrix(data.as_bytes()),
            Err(DataError::Parse(_))
        ));
    }

    #[test]
    fn test_header_without_assets() {
        let data = "date\n2024-01-02\n";
        assert!(matches!(
            read_price_matrix(data.as_bytes()),
            Err(DataError::NoAssets)
        ));
    }
}
