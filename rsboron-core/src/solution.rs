//! Isotopic composition of aqueous boron species
//!
//! Solves the exact isotope mass balance between B(OH)3 and B(OH)4- at
//! equilibrium (Rae, 2018). Unlike [`crate::isotopes::mass_balance_split`],
//! no linear approximation of the delta notation is made: the balance is
//! closed in terms of isotope ratios.
//!
//! # Algorithm
//!
//! 1. Convert the bulk delta to a ratio $R_T$
//! 2. $H = 10^{-pH}$
//! 3. Implied dissociation constant $K_B = [BO_4] H / (B_T - [BO_4])$
//! 4. Solve the quadratic mass balance for $R_{B4}$, keeping the positive root
//! 5. $R_{B3} = \alpha R_{B4}$
//!
//! # Reference
//!
//! Rae, J. W. B. (2018). Boron Isotopes in Foraminifera: Systematics,
//! Biomineralisation, and CO2 Reconstruction.

use crate::errors::{BoronError, BoronResult};
use crate::isotopes::{delta_to_ratio, ratio_to_delta, SpeciesDeltas};
use crate::FloatValue;

/// Calculate the delta 11B of B(OH)4- and B(OH)3 in solution
///
/// # Arguments
///
/// * `ph` - Solution pH
/// * `total_b` - Total dissolved boron
/// * `bo4` - B(OH)4- concentration, same units as `total_b`
/// * `alpha` - B(OH)3/B(OH)4- fractionation factor
/// * `delta_total` - Bulk solution delta 11B (per mil)
/// * `reference_ratio` - 11B/10B of the delta reference
///
/// # Errors
///
/// Returns a domain error if B(OH)3 is absent (the implied dissociation
/// constant diverges), if any concentration is out of range, or if the
/// quadratic has no physical root.
pub fn solve(
    ph: FloatValue,
    total_b: FloatValue,
    bo4: FloatValue,
    alpha: FloatValue,
    delta_total: FloatValue,
    reference_ratio: FloatValue,
) -> BoronResult<SpeciesDeltas> {
    if !ph.is_finite() {
        return Err(BoronError::domain("pH", format!("must be finite, got {ph}")));
    }
    if !total_b.is_finite() || total_b <= 0.0 {
        return Err(BoronError::domain(
            "total boron",
            format!("must be finite and positive, got {total_b}"),
        ));
    }
    if !bo4.is_finite() || bo4 < 0.0 {
        return Err(BoronError::domain(
            "B(OH)4- concentration",
            format!("must be finite and non-negative, got {bo4}"),
        ));
    }
    if total_b - bo4 <= 0.0 {
        return Err(BoronError::domain(
            "B(OH)3 concentration",
            format!(
                "total boron ({total_b}) must exceed B(OH)4- ({bo4}); \
                 the dissociation constant is undefined without B(OH)3"
            ),
        ));
    }
    if !alpha.is_finite() || alpha <= 0.0 {
        return Err(BoronError::domain(
            "fractionation factor",
            format!("must be finite and positive, got {alpha}"),
        ));
    }
    if !delta_total.is_finite() {
        return Err(BoronError::domain(
            "bulk delta 11B",
            format!("must be finite, got {delta_total}"),
        ));
    }

    let r_t = delta_to_ratio(delta_total, reference_ratio);
    let h = 10.0_f64.powf(-ph);
    let kb = bo4 * h / (total_b - bo4);
    if !kb.is_finite() {
        return Err(BoronError::domain(
            "dissociation constant",
            format!("non-finite for pH={ph}, total boron={total_b}, B(OH)4-={bo4}"),
        ));
    }

    let r_b4 = borate_ratio(h, kb, r_t, alpha);
    if !r_b4.is_finite() || r_b4 < 0.0 {
        return Err(BoronError::domain(
            "B(OH)4- isotope ratio",
            format!("mass balance has no physical root (got {r_b4})"),
        ));
    }
    let r_b3 = alpha * r_b4;

    Ok(SpeciesDeltas {
        bo4: ratio_to_delta(r_b4, reference_ratio),
        bo3: ratio_to_delta(r_b3, reference_ratio),
    })
}

/// Positive root of the isotope mass balance for the B(OH)4- ratio
///
/// The mass balance in terms of 11B abundance,
///
/// $$\frac{K_B}{H + K_B} \frac{R_4}{1 + R_4} + \frac{H}{H + K_B} \frac{\alpha R_4}{1 + \alpha R_4} = \frac{R_T}{1 + R_T}$$
///
/// rearranges to a quadratic in $R_4$. Only the `+` branch of the root is
/// non-negative; the other is never physical.
fn borate_ratio(h: FloatValue, kb: FloatValue, r_t: FloatValue, alpha: FloatValue) -> FloatValue {
    let discriminant = h.powi(2) * r_t.powi(2)
        + 2.0 * h.powi(2) * r_t * alpha
        + h.powi(2) * alpha.powi(2)
        + 2.0 * h * kb * r_t.powi(2) * alpha
        - 2.0 * h * kb * r_t * alpha.powi(2)
        + 8.0 * h * kb * r_t * alpha
        - 2.0 * h * kb * r_t
        + 2.0 * h * kb * alpha
        + kb.powi(2) * r_t.powi(2) * alpha.powi(2)
        + 2.0 * kb.powi(2) * r_t * alpha
        + kb.powi(2);

    (discriminant.sqrt() - h * alpha - kb + h * r_t + kb * r_t * alpha) / (2.0 * alpha * (h + kb))
}
