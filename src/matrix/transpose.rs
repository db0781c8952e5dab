/// Writes the `cols × rows` transpose of a row-major `rows × cols` slice.
///
/// RHS packing calls this to lay a `depth × cols` operand out as
/// `cols × depth`, so each destination column becomes one packed row.
///
/// ```
/// use qmatmul::matrix::transpose::transpose;
///
/// let depth_by_cols: Vec<i8> = vec![1, 2, 3, 4, 5, 6];
/// let mut cols_by_depth = vec![0; 6];
/// transpose(&depth_by_cols, &mut cols_by_depth, 2, 3);
/// assert_eq!(cols_by_depth, vec![1, 4, 2, 5, 3, 6]);
/// ```
pub fn transpose<T: Copy>(src: &[T], dst: &mut [T], rows: usize, cols: usize) {
    assert_eq!(src.len(), rows * cols, "src: expected {}x{} elements", rows, cols);
    assert_eq!(dst.len(), rows * cols, "dst: expected {}x{} elements", cols, rows);
    for i in 0..rows {
        for j in 0..cols {
            dst[j * rows + i] = src[i * cols + j];
        }
    }
}
