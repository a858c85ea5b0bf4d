// ジョブハッシュ: SHA-256（正規化JSON）
//
// Computes the content-addressed identity of a job. The key is a SHA-256 hash
// of the canonical JSON form, encoded as a lowercase hexadecimal string.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::data::{JobData, JobDataView, Scalar};

fn scalar_to_json(scalar: Scalar<'_>) -> Value {
    match scalar {
        Scalar::Str(s) => Value::String(s.to_string()),
        Scalar::Int(n) => Value::from(n),
        Scalar::Bool(b) => Value::Bool(b),
    }
}

/// ジョブデータを正規化JSON形式に変換する（キーはアルファベット順で固定）。
pub fn canonical_json(data: &JobData) -> crate::error::Result<String> {
    let json = match data.view()? {
        JobDataView::Scalar(scalar) => serde_json::to_string(&scalar_to_json(scalar))?,
        JobDataView::Map(entries) => {
            let map: BTreeMap<&str, Value> = entries
                .into_iter()
                .map(|(k, v)| (k, scalar_to_json(v)))
                .collect();
            serde_json::to_string(&map)?
        }
    };
    Ok(json)
}

/// ジョブデータからジョブハッシュ（SHA-256 hex）を計算する。
///
/// キーの挿入順序に依存しない。プロセスをまたいでも同じ値になる。
pub fn compute_job_hash(data: &JobData) -> crate::error::Result<String> {
    let canonical = canonical_json(data)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
