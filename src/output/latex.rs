/// A booktabs `tabular` block.
#[derive(Debug, Clone)]
pub struct LatexTable {
    columns: String,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl LatexTable {
    /// Label column on the left, `n_values` right-aligned value columns.
    pub fn with_label_column(header: Vec<String>, n_values: usize) -> Self {
        let mut columns = String::from("l");
        for _ in 0..n_values {
            columns.push_str(" r");
        }
        Self::new(columns, header)
    }

    pub fn new(columns: impl Into<String>, header: Vec<String>) -> Self {
        Self {
            columns: columns.into(),
            header,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("\\begin{{tabular}}{{{}}}\n", self.columns));
        out.push_str("\\toprule\n");
        out.push_str(&format!("{} \\\\\n", self.header.join(" & ")));
        out.push_str("\\midrule\n");
        for row in &self.rows {
            out.push_str(&format!("{} \\\\\n", row.join(" & ")));
        }
        out.push_str("\\bottomrule\n");
        out.push_str("\\end{tabular}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_booktabs_block() {
        let mut table =
            LatexTable::with_label_column(vec!["File".into(), "A".into(), "B".into()], 2);
        table.push_row(vec!["S1".into(), "1.00".into(), "---".into()]);
        assert_eq!(table.n_rows(), 1);
        assert_eq!(
            table.render(),
            "\\begin{tabular}{l r r}\n\
             \\toprule\n\
             File & A & B \\\\\n\
             \\midrule\n\
             S1 & 1.00 & --- \\\\\n\
             \\bottomrule\n\
             \\end{tabular}\n"
        );
    }
}
