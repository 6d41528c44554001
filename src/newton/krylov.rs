use ndarray::prelude::*;
use ndarray::NdFloat;

use super::trust_region::validate_radius;
use super::{trust_region_loop, ModelStep};
use crate::error::{OptimizeError, Result};
use crate::finite_diff::hessian_vector_product;
use crate::problem::Problem;
use crate::result::{OptimizeOptions, OptimizeResult};
use crate::vecops::{lit, negate, norm};

/// Options for [`krylov_trust_region`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KrylovOptions<A> {
    pub base: OptimizeOptions<A>,
    /// Starting radius (default `1`)
    pub initial_delta: A,
    /// Radius cap (default `100`)
    pub max_delta: A,
    /// Smallest reduction ratio for which a step is taken (default `0.1`)
    pub eta: A,
    /// Below this ratio the radius shrinks by 4 (default `0.25`)
    pub rho_lower: A,
    /// Above this ratio a boundary step doubles the radius (default `0.75`)
    pub rho_upper: A,
    /// Relative residual at which inner CG stops (default `0.01`)
    pub cg_tol: A,
}

impl<A: NdFloat> Default for KrylovOptions<A> {
    fn default() -> Self {
        KrylovOptions::new(OptimizeOptions::default())
    }
}

impl<A: NdFloat> KrylovOptions<A> {
    pub fn new(base: OptimizeOptions<A>) -> Self {
        KrylovOptions {
            base,
            initial_delta: A::one(),
            max_delta: lit(100.),
            eta: lit(0.1),
            rho_lower: lit(0.25),
            rho_upper: lit(0.75),
            cg_tol: lit(0.01),
        }
    }

    pub fn with_radius(mut self, initial_delta: A, max_delta: A) -> Self {
        self.initial_delta = initial_delta;
        self.max_delta = max_delta;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_radius(self.initial_delta, self.max_delta)?;
        if !(self.cg_tol > A::zero() && self.cg_tol < A::one()) {
            return Err(OptimizeError::InvalidOption(format!(
                "Krylov cg_tol must lie in (0, 1), got {}",
                self.cg_tol
            )));
        }
        Ok(())
    }
}

/// $`\tau \ge 0`$ with $`\|z + \tau d\| = \delta`$
fn boundary_tau<A: NdFloat>(z: &Array1<A>, d: &Array1<A>, radius: A) -> A {
    let a = d.dot(d);
    let b = lit::<A>(2.) * z.dot(d);
    let c = z.dot(z) - radius * radius;
    let disc = (b * b - lit::<A>(4.) * a * c).max(A::zero());
    (-b + disc.sqrt()) / (lit::<A>(2.) * a)
}

/// Steihaug–Toint truncated conjugate gradient
///
/// Runs CG on $`Hp = -g`$ from $`p = 0`$ and stops at the first of: residual
/// below `cg_tol` relative to $`\|g\|`$, an iterate leaving the ball, or a
/// direction of negative curvature. The last two end on the boundary.
/// `hv` returns Hessian-vector products; $`Hp`$ is carried along so the
/// model value needs no extra products.
fn steihaug<A, H>(hv: H, g: ArrayView1<A>, radius: A, cg_tol: A) -> ModelStep<A>
where
    A: NdFloat,
    H: Fn(ArrayView1<A>) -> Array1<A>,
{
    let half = lit::<A>(0.5);
    let model = |step: Array1<A>, h_step: &Array1<A>, on_boundary: bool| ModelStep {
        predicted: -(g.dot(&step) + half * step.dot(h_step)),
        step,
        on_boundary,
    };

    let n = g.len();
    let mut z = Array1::<A>::zeros(n);
    let mut hz = Array1::<A>::zeros(n);
    let mut r = g.to_owned();
    let mut d = negate(&r);
    let tol_sq = cg_tol * cg_tol * r.dot(&r);

    for _ in 0..n {
        let hd = hv(d.view());
        let dhd = d.dot(&hd);
        if dhd < A::zero() {
            let tau = boundary_tau(&z, &d, radius);
            return model(&z + &(&d * tau), &(&hz + &(&hd * tau)), true);
        }
        if dhd.abs() < lit(1e-15) {
            break;
        }

        let rr = r.dot(&r);
        let alpha = rr / dhd;
        let z_new = &z + &(&d * alpha);
        if norm(&z_new) >= radius {
            let tau = boundary_tau(&z, &d, radius);
            return model(&z + &(&d * tau), &(&hz + &(&hd * tau)), true);
        }
        z = z_new;
        hz.scaled_add(alpha, &hd);
        r.scaled_add(alpha, &hd);

        let rr_new = r.dot(&r);
        if rr_new < tol_sq {
            break;
        }
        d *= rr_new / rr;
        d -= &r;
    }
    model(z, &hz, false)
}

/// $`\nabla^2 f(x)v`$ differenced along the unit vector $`v/\|v\|`$ and
/// scaled back by $`\|v\|`$
fn unit_hessian_product<A, G>(grad: G, x: ArrayView1<A>, v: ArrayView1<A>, gx: ArrayView1<A>) -> Array1<A>
where
    A: NdFloat,
    G: Fn(ArrayView1<A>) -> Array1<A>,
{
    let v_norm = norm(&v);
    if !(v_norm > A::zero()) {
        return Array1::zeros(v.len());
    }
    let unit = v.mapv(|e| e / v_norm);
    let mut hv = hessian_vector_product(grad, x, unit.view(), gx);
    hv *= v_norm;
    hv
}

/// Newton trust region with a Krylov subspace (Steihaug–Toint) solver
///
/// The trust region subproblem is solved approximately by truncated CG,
/// which needs only products $`\nabla^2 f(x)v`$. These are approximated by
/// a forward difference of gradients,
/// ```math
/// \nabla^2 f(x)v \approx \frac{\nabla f(x + hv) - \nabla f(x)}{h}
/// ```
/// so each inner CG iteration costs one gradient evaluation and the Hessian
/// is never formed. Suited to problems too large for [`newton_trust_region`](super::newton_trust_region).
///
/// The radius shrinks by 4 when $`\rho < \rho_{lower}`$ and doubles (up to
/// `max_delta`) when $`\rho > \rho_{upper}`$ and CG stopped on the boundary.
pub fn krylov_trust_region<A: NdFloat>(
    problem: &Problem<'_, A>,
    x0: ArrayView1<A>,
    opts: &KrylovOptions<A>,
) -> OptimizeResult<A> {
    if let Err(err) = opts.validate() {
        return OptimizeResult::rejected(problem, x0, err);
    }
    trust_region_loop(
        "krylov trust region",
        problem,
        x0,
        opts.initial_delta,
        opts.eta,
        |x, g, delta| {
            let hv = |v: ArrayView1<A>| unit_hessian_product(|y: ArrayView1<A>| problem.gradient(y), x, v, g);
            steihaug(hv, g, delta, opts.cg_tol)
        },
        |delta, rho, m| {
            if rho < opts.rho_lower {
                lit::<A>(0.25) * delta
            } else if rho > opts.rho_upper && m.on_boundary {
                (delta + delta).min(opts.max_delta)
            } else {
                delta
            }
        },
        &opts.base,
    )
}
