mod energy;
mod power;
mod rate;
mod soc;

pub use self::{
    energy::WattHours,
    power::Watts,
    rate::KilowattHourRate,
    soc::StateOfCharge,
};
