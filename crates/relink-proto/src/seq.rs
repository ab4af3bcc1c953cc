//! 16 ビット循環シーケンス空間
//!
//! 有効な ID は `[MIN, MAX]`（1..=0xFFFE）。0 は「なし」を表す予約値で、
//! `next` / `previous` は 0 を飛ばして MAX ↔ MIN でラップアラウンドする。

/// 信頼メッセージのシーケンス ID
///
/// `SequenceId::INVALID`（0）はヘッダー上で「信頼メッセージなし」「ACK なし」を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceId(pub u16);

impl SequenceId {
    /// 予約値（無効 ID）
    pub const INVALID: Self = SequenceId(0);

    /// 最小の有効 ID
    pub const MIN: Self = SequenceId(1);

    /// 最大の有効 ID（u16::MAX の 1 つ手前）
    pub const MAX: Self = SequenceId(u16::MAX - 1);

    /// 有効範囲内か
    pub fn is_valid(&self) -> bool {
        self.0 >= Self::MIN.0 && self.0 <= Self::MAX.0
    }

    /// 次の ID（MAX の次は MIN）
    pub fn next(self) -> Self {
        debug_assert!(self.is_valid(), "next() on out-of-domain id {}", self.0);
        if self.0 >= Self::MAX.0 {
            Self::MIN
        } else {
            SequenceId(self.0 + 1)
        }
    }

    /// 前の ID（MIN の前は MAX）
    pub fn previous(self) -> Self {
        debug_assert!(self.is_valid(), "previous() on out-of-domain id {}", self.0);
        if self.0 <= Self::MIN.0 {
            Self::MAX
        } else {
            SequenceId(self.0 - 1)
        }
    }

    /// `lo` から `hi` まで（両端含む、ラップアラウンドあり）前進したときに `id` を通過するか
    ///
    /// 受信した ACK が未 ACK 範囲に含まれるかの判定に使う。
    /// どれかが無効 ID の場合は常に `false`。
    pub fn in_range(id: Self, lo: Self, hi: Self) -> bool {
        if !id.is_valid() || !lo.is_valid() || !hi.is_valid() {
            return false;
        }

        if lo.0 <= hi.0 {
            lo.0 <= id.0 && id.0 <= hi.0
        } else {
            // MAX → MIN をまたいでいる
            id.0 >= lo.0 || id.0 <= hi.0
        }
    }

    /// `lo` から `hi` まで前進するステップ数（`lo == hi` なら 0）
    pub fn distance(lo: Self, hi: Self) -> u16 {
        debug_assert!(lo.is_valid() && hi.is_valid());
        if hi.0 >= lo.0 {
            hi.0 - lo.0
        } else {
            (Self::MAX.0 - lo.0) + (hi.0 - Self::MIN.0) + 1
        }
    }

    /// 生の u16 値を返す
    pub fn raw(&self) -> u16 {
        self.0
    }
}

impl From<u16> for SequenceId {
    fn from(val: u16) -> Self {
        SequenceId(val)
    }
}

impl core::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_wraps_over_reserved() {
        assert_eq!(SequenceId::MAX.next(), SequenceId::MIN);
        assert_eq!(SequenceId(1).next(), SequenceId(2));
    }

    #[test]
    fn test_previous_wraps_over_reserved() {
        assert_eq!(SequenceId::MIN.previous(), SequenceId::MAX);
        assert_eq!(SequenceId(100).previous(), SequenceId(99));
    }

    #[test]
    fn test_in_range_plain() {
        let lo = SequenceId(10);
        let hi = SequenceId(20);
        assert!(SequenceId::in_range(SequenceId(10), lo, hi));
        assert!(SequenceId::in_range(SequenceId(15), lo, hi));
        assert!(SequenceId::in_range(SequenceId(20), lo, hi));
        assert!(!SequenceId::in_range(SequenceId(9), lo, hi));
        assert!(!SequenceId::in_range(SequenceId(21), lo, hi));
    }

    #[test]
    fn test_in_range_wrapped() {
        // 0xFFFC, 0xFFFD, 0xFFFE, 1, 2
        let lo = SequenceId(0xFFFC);
        let hi = SequenceId(2);
        assert!(SequenceId::in_range(SequenceId(0xFFFE), lo, hi));
        assert!(SequenceId::in_range(SequenceId(1), lo, hi));
        assert!(SequenceId::in_range(SequenceId(2), lo, hi));
        assert!(!SequenceId::in_range(SequenceId(3), lo, hi));
        assert!(!SequenceId::in_range(SequenceId(0xFFFB), lo, hi));
    }

    #[test]
    fn test_in_range_rejects_invalid() {
        assert!(!SequenceId::in_range(SequenceId::INVALID, SequenceId(1), SequenceId(5)));
        assert!(!SequenceId::in_range(SequenceId(3), SequenceId::INVALID, SequenceId(5)));
        assert!(!SequenceId::in_range(SequenceId(0xFFFF), SequenceId(1), SequenceId(5)));
    }

    #[test]
    fn test_distance() {
        assert_eq!(SequenceId::distance(SequenceId(5), SequenceId(5)), 0);
        assert_eq!(SequenceId::distance(SequenceId(5), SequenceId(8)), 3);
        assert_eq!(SequenceId::distance(SequenceId::MAX, SequenceId::MIN), 1);
        assert_eq!(SequenceId::distance(SequenceId(0xFFFD), SequenceId(2)), 3);
    }
}
