//! Butcher tableaus for the two integrators, as compile-time constants.
//!
//! The Radau-IIA(5) tables carry the diagonalising transformation of the RK
//! matrix alongside the tableau itself:
//!
//! ```text
//! Tinv * inv(A) * T =  | gamma    0       0     |
//!                      |   0    alpha  -beta    |
//!                      |   0    beta    alpha   |
//! ```
//!
//! so the three coupled implicit stages decouple into one real and one
//! complex N×N system per Newton iteration.

/// Three-stage, fifth-order, L-stable Radau-IIA coefficients.
pub mod radau5 {
    pub const A: [[f64; 3]; 3] = [
        [
            1.968154772236604258683861429918299e-1,
            -6.55354258501983881085227825696087e-2,
            2.377097434822015242040823210718965e-2,
        ],
        [
            3.944243147390872769974116714584975e-1,
            2.920734116652284630205027458970589e-1,
            -4.154875212599793019818600988496743e-2,
        ],
        [
            3.764030627004672750500754423692808e-1,
            5.124858261884216138388134465196080e-1,
            1.111111111111111111111111111111111e-1,
        ],
    ];

    pub const B: [f64; 3] = [
        3.764030627004672750500754423692808e-1,
        5.124858261884216138388134465196080e-1,
        1.111111111111111111111111111111111e-1,
    ];

    pub const C: [f64; 3] = [
        1.550510257216821901802715925294109e-1,
        6.449489742783178098197284074705891e-1,
        1.0,
    ];

    /// Weights of the classical embedded error estimator:
    /// `h * sum (b_j - bhat_j) f(Z_j) = h * E[0] * f0 + sum E_j * Z_j / h`.
    pub const E: [f64; 4] = [
        0.05,
        -10.04880939982741556246032950764708 * 0.05,
        1.382142733160748895793662840980412 * 0.05,
        -0.3333333333333333333333333333333333 * 0.05,
    ];

    /// Local order of the embedded error estimator.
    pub const ELO: f64 = 4.0;

    /// Real eigenvalue of `inv(A)`.
    pub const GAMMA: f64 = 3.637834252744495732208418513577775;
    /// Real part of the complex eigenvalue pair of `inv(A)`.
    pub const ALPHA: f64 = 2.681082873627752133895790743211112;
    /// Imaginary part of the complex eigenvalue pair of `inv(A)`.
    pub const BETA: f64 = 3.050430199247410569426377624787569;

    pub const T: [[f64; 3]; 3] = [
        [
            9.443876248897524148749007950641664e-2,
            -1.412552950209542084279903838077973e-1,
            -3.00291941051474244918611170890539e-2,
        ],
        [
            2.502131229653333113765090675125018e-1,
            2.041293522937999319959908102983381e-1,
            3.829421127572619377954382335998733e-1,
        ],
        [1.0, 1.0, 0.0e0],
    ];

    pub const T_INV: [[f64; 3]; 3] = [
        [
            4.178718591551904727346462658512057,
            3.27682820761062387082533272429617e-1,
            5.233764454994495480399309159089876e-1,
        ],
        [
            -4.178718591551904727346462658512057,
            -3.27682820761062387082533272429617e-1,
            4.766235545005504519600690840910124e-1,
        ],
        [
            -5.02872634945786875951247343139544e-1,
            2.571926949855605429186785353601676e0,
            -5.960392048282249249688219110993024e-1,
        ],
    ];

    pub const T_INV_A_INV: [[f64; 3]; 3] = [
        [
            1.520148562492775501049204957366528e+1,
            1.192055789400527921212348994770778,
            1.903956760517560343018332287285119,
        ],
        [
            -9.669512977505946748632625374449567,
            -8.724028436822336183071773193986487,
            3.096043239482439656981667712714881,
        ],
        [
            -1.409513259499574544876303981551774e+1,
            5.895975725255405108079130152868952,
            -1.441236197545344702389881889085515e-1,
        ],
    ];

    pub const A_INV_T: [[f64; 3]; 3] = [
        [
            0.3435525649691961614912493915818282,
            -0.4703191128473198422370558694426832,
            0.3503786597113668965366406634269080,
        ],
        [
            0.9102338692094599309122768354288852,
            1.715425895757991796035292755937326,
            0.4040171993145015239277111187301784,
        ],
        [
            3.637834252744495732208418513577775,
            2.681082873627752133895790743211112,
            -3.050430199247410569426377624787569,
        ],
    ];
}

/// Classical Fehlberg 4(5) pair: six stages, 5th-order propagated solution,
/// 4th-order companion for the error estimate.
pub mod rkf45 {
    pub const C: [f64; 6] = [0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0];

    #[rustfmt::skip]
    pub const A: [[f64; 5]; 6] = [
        [0.0, 0.0, 0.0, 0.0, 0.0],
        [1.0 / 4.0, 0.0, 0.0, 0.0, 0.0],
        [3.0 / 32.0, 9.0 / 32.0, 0.0, 0.0, 0.0],
        [1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0, 0.0, 0.0],
        [439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0, 0.0],
        [-8.0 / 27.0, 2.0, -3554.0 / 2565.0, 1859.0 / 4104.0, -11.0 / 40.0],
    ];

    /// Fifth-order weights (propagated solution).
    pub const B: [f64; 6] = [
        16.0 / 135.0,
        0.0,
        6656.0 / 12825.0,
        28561.0 / 56430.0,
        -9.0 / 50.0,
        2.0 / 55.0,
    ];

    /// Error weights, the difference of the fourth- and fifth-order formulas.
    pub const E: [f64; 6] = [
        1.0 / 360.0,
        0.0,
        -128.0 / 4275.0,
        -2197.0 / 75240.0,
        1.0 / 50.0,
        2.0 / 55.0,
    ];

    /// Local order entering the step-size controller.
    pub const ELO: f64 = 5.0;
}

#[cfg(test)]
mod test {
    use super::*;

    fn matmul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
        let mut c = [[0.0; 3]; 3];
        for (i, row) in a.iter().enumerate() {
            for j in 0..3 {
                c[i][j] = (0..3).map(|k| row[k] * b[k][j]).sum();
            }
        }
        c
    }

    #[test]
    fn radau_b_is_last_row_of_a() {
        for j in 0..3 {
            assert_eq!(radau5::A[2][j], radau5::B[j]);
        }
    }

    #[test]
    fn radau_weights_sum_to_one() {
        let sum: f64 = radau5::B.iter().sum();
        assert!((sum - 1.0).abs() < 1e-15);
    }

    #[test]
    fn radau_row_sums_match_nodes() {
        for i in 0..3 {
            let sum: f64 = radau5::A[i].iter().sum();
            assert!((sum - radau5::C[i]).abs() < 1e-14);
        }
    }

    #[test]
    fn radau_t_times_t_inv_is_identity() {
        let prod = matmul(&radau5::T, &radau5::T_INV);
        for (i, row) in prod.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-13, "({i},{j}) = {v}");
            }
        }
    }

    #[test]
    fn radau_diagonalisation_recovers_eigenvalues() {
        // Tinv * inv(A) * T must be block diagonal with gamma and alpha +- i beta
        let m = matmul(&radau5::T_INV_A_INV, &radau5::T);
        assert!((m[0][0] - radau5::GAMMA).abs() < 1e-12);
        assert!((m[1][1] - radau5::ALPHA).abs() < 1e-12);
        assert!((m[2][2] - radau5::ALPHA).abs() < 1e-12);
        assert!((m[1][2] + radau5::BETA).abs() < 1e-12);
        assert!((m[2][1] - radau5::BETA).abs() < 1e-12);
        assert!(m[0][1].abs() < 1e-12 && m[0][2].abs() < 1e-12);
        assert!(m[1][0].abs() < 1e-12 && m[2][0].abs() < 1e-12);
    }

    #[test]
    fn radau_a_inv_t_matches_tables() {
        // A * (inv(A) T) = T
        let prod = matmul(&radau5::A, &radau5::A_INV_T);
        for (i, row) in prod.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                assert!((v - radau5::T[i][j]).abs() < 1e-13, "({i},{j}) = {v}");
            }
        }
    }

    #[test]
    fn rkf45_row_sums_match_nodes() {
        for i in 0..6 {
            let sum: f64 = rkf45::A[i].iter().sum();
            assert!((sum - rkf45::C[i]).abs() < 1e-14);
        }
    }

    #[test]
    fn rkf45_weights_sum_to_one() {
        let b: f64 = rkf45::B.iter().sum();
        assert!((b - 1.0).abs() < 1e-15);
        // error weights are a difference of two consistent formulas
        let e: f64 = rkf45::E.iter().sum();
        assert!(e.abs() < 1e-15);
    }
}
