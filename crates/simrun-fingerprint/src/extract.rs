//! Fingerprint status lines in simulation output

use regex::Regex;

use crate::fingerprint::Fingerprint;

/// What the simulation reported about its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintStatus {
    /// The calculated fingerprint matched the one passed in
    Verified(Fingerprint),
    /// The calculated fingerprint differs from the one passed in
    Mismatch(Fingerprint),
}

impl FingerprintStatus {
    /// The fingerprint the simulation calculated
    pub fn calculated(&self) -> &Fingerprint {
        match self {
            Self::Verified(fp) | Self::Mismatch(fp) => fp,
        }
    }
}

const HASH_PATTERN: &str = "([0-9a-f]{4}-[0-9a-f]{4})";

/// Find the fingerprint status for `ingredients`, looking at standard error
/// first and standard output second
pub fn extract_fingerprint_status(stdout: &str, stderr: &str, ingredients: &str) -> Option<FingerprintStatus> {
    find_status(stderr, ingredients).or_else(|| find_status(stdout, ingredients))
}

fn find_status(output: &str, ingredients: &str) -> Option<FingerprintStatus> {
    let ingredients_pattern = regex::escape(ingredients);
    let verified = Regex::new(&format!(
        r"(?m)Fingerprint successfully verified:.*?[ ,]{}/{}(?:[ ,]|$)",
        HASH_PATTERN, ingredients_pattern
    ))
    .ok()?;
    if let Some(captures) = verified.captures(output) {
        return Some(FingerprintStatus::Verified(Fingerprint::new(&captures[1], ingredients)));
    }

    let mismatch = Regex::new(&format!(
        r"Fingerprint mismatch! calculated:.*?[ ,]{}/{}[ ,].*expected",
        HASH_PATTERN, ingredients_pattern
    ))
    .ok()?;
    mismatch
        .captures(output)
        .map(|captures| FingerprintStatus::Mismatch(Fingerprint::new(&captures[1], ingredients)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verified() {
        let stdout = "Running simulation...\n<!> Fingerprint successfully verified: 53c0-a4d0/tplx\nEnd.\n";
        assert_eq!(
            extract_fingerprint_status(stdout, "", "tplx"),
            Some(FingerprintStatus::Verified(Fingerprint::new("53c0-a4d0", "tplx")))
        );
    }

    #[test]
    fn test_mismatch_in_stderr() {
        let stderr = "<!> Error: Fingerprint mismatch! calculated: 1234-abcd/tplx, expected: 53c0-a4d0/tplx\n";
        let status = extract_fingerprint_status("", stderr, "tplx").unwrap();
        assert_eq!(status, FingerprintStatus::Mismatch(Fingerprint::new("1234-abcd", "tplx")));
        assert_eq!(status.calculated().to_string(), "1234-abcd/tplx");
    }

    #[test]
    fn test_picks_requested_ingredients() {
        let stdout = "<!> Fingerprint successfully verified: 1111-2222/tplx 3333-4444/~tNl\n";
        assert_eq!(
            extract_fingerprint_status(stdout, "", "~tNl").unwrap().calculated().hash(),
            "3333-4444"
        );
    }

    #[test]
    fn test_comma_separated_fingerprints() {
        let stderr = "<!> Error: Fingerprint mismatch! calculated: 1111-2222/tplx,3333-4444/~tNl, expected: 0000-0000/tplx,0000-0000/~tNl\n";
        assert_eq!(
            extract_fingerprint_status("", stderr, "~tNl"),
            Some(FingerprintStatus::Mismatch(Fingerprint::new("3333-4444", "~tNl")))
        );
    }

    #[test]
    fn test_ingredients_must_match_exactly() {
        let stdout = "<!> Fingerprint successfully verified: 53c0-a4d0/tplx\n";
        assert_eq!(extract_fingerprint_status(stdout, "", "tpl"), None);
    }

    #[test]
    fn test_no_status() {
        assert_eq!(extract_fingerprint_status("End.\n", "", "tplx"), None);
        let other = "<!> Fingerprint successfully verified: 53c0-a4d0/tplx\n";
        assert_eq!(extract_fingerprint_status(other, "", "sz"), None);
    }
}
