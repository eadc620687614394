/// The number of allocation units backing a file of `length` bytes. Every
/// file owns at least one unit, a zero-length file included.
pub fn units_for_length(length: i64, unit_bytes: i64) -> i64 {
    if length <= 0 {
        return 1;
    }

    if length % unit_bytes != 0 {
        return length / unit_bytes + 1;
    } else {
        return length / unit_bytes;
    }
}
