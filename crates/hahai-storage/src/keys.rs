//! 存储键命名规则
//!
//! 元数据与影像共用 `record:{id}` 前缀，临时ID自带 `temp-` 前缀。

use hahai_core::ImageKind;

/// 全部实习生ID集合
pub const ALL_INTERNS_KEY: &str = "interns";
/// 全部永久病例ID集合
pub const ALL_RECORDS_KEY: &str = "records";

pub fn intern_key(student_id: &str) -> String {
    format!("intern:{}", student_id)
}

/// 实习生拥有的永久病例集合
///
/// 独立命名空间：任何 `intern:{id}` 都不会与之重合。
pub fn intern_records_key(student_id: &str) -> String {
    format!("intern_records:{}", student_id)
}

pub fn record_key(case_id: &str) -> String {
    format!("record:{}", case_id)
}

pub fn image_key(case_id: &str, kind: ImageKind) -> String {
    format!("record:{}:{}", case_id, kind.suffix())
}

pub fn intern_session_key(token: &str) -> String {
    format!("session:intern:{}", token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keys_share_prefix() {
        let meta = record_key("temp-abc");
        assert_eq!(meta, "record:temp-abc");
        assert_eq!(image_key("temp-abc", ImageKind::Xray), "record:temp-abc:xray");
        assert_eq!(image_key("temp-abc", ImageKind::Gradcam), "record:temp-abc:gradcam");
        for kind in ImageKind::ALL {
            assert!(image_key("temp-abc", kind).starts_with(&meta));
        }
    }

    #[test]
    fn test_intern_keys() {
        assert_eq!(intern_key("S1"), "intern:S1");
        assert_eq!(intern_records_key("S1"), "intern_records:S1");
        assert_eq!(intern_session_key("tok"), "session:intern:tok");
    }

    #[test]
    fn test_owner_index_never_matches_intern_key() {
        for sid in ["S1", "S1:records", "records:S1", ""] {
            let index = intern_records_key(sid);
            for other in ["S1", "S1:records", "_records:S1", "records:S1", ""] {
                assert_ne!(index, intern_key(other));
            }
        }
    }
}
