//! Runnable version of the gas station scenario (spec.md §8 scenario 5):
//! cars arrive at random intervals, queue for a pump bay, then draw fuel
//! from a shared depletable tank; a tank truck is dispatched once the tank
//! runs low. Prints a summary of the run instead of just asserting on it,
//! the way `cursorium`'s `examples/demo.rs` narrates its own scenarios.

use desim::{CapacityMode, ComponentGenerator, ComponentId, Environment, Intent, Process, RequestIntent, Resource, ResourceClaim, RunUntil};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::info;

const TANK_CAPACITY: f64 = 2000.0;
const PUMP_BAYS: f64 = 2.0;
const REFUEL_RATE_L_PER_S: f64 = 2.0;
const TRUCK_HOLD_SECONDS: f64 = 300.0;
const LOW_LEVEL_FRACTION: f64 = 0.25;
const RUN_DURATION_SECONDS: f64 = 20_000.0;

enum CarStep {
	RequestBay,
	RequestFuel(f64),
	Refueling,
	Done,
}

struct Car {
	bays: Rc<RefCell<Resource>>,
	tank: Rc<RefCell<Resource>>,
	truck_in_flight: Rc<RefCell<bool>>,
	truck_spawns: Rc<RefCell<u32>>,
	cars_served: Rc<RefCell<u32>>,
	fuel_amount: f64,
	step: CarStep,
}

impl Process for Car {
	fn resume(&mut self, env: &mut Environment, me: ComponentId) -> Intent {
		match std::mem::replace(&mut self.step, CarStep::Done) {
			CarStep::RequestBay => {
				self.step = CarStep::RequestFuel(self.fuel_amount);
				Intent::Request(RequestIntent {
					claims: vec![ResourceClaim { resource: Rc::clone(&self.bays), quantity: 1.0 }],
					one_of: false,
					priority: 0,
					fail_at: None,
					fail_delay: None,
				})
			}
			CarStep::RequestFuel(amount) => {
				self.step = CarStep::Refueling;
				Intent::Request(RequestIntent {
					claims: vec![ResourceClaim { resource: Rc::clone(&self.tank), quantity: amount }],
					one_of: false,
					priority: 0,
					fail_at: None,
					fail_delay: None,
				})
			}
			CarStep::Refueling => {
				maybe_spawn_tank_truck(env, &self.tank, &self.truck_in_flight, &self.truck_spawns);
				self.step = CarStep::Done;
				Intent::Hold {
					duration: self.fuel_amount / REFUEL_RATE_L_PER_S,
					priority: 0,
				}
			}
			CarStep::Done => {
				let honors = self.bays.borrow_mut().release(env.now(), me, None);
				env.apply_resource_honors(&honors).unwrap();
				*self.cars_served.borrow_mut() += 1;
				Intent::End
			}
		}
	}
}

enum TruckStep {
	Driving,
	Refilling,
}

struct TankTruck {
	tank: Rc<RefCell<Resource>>,
	truck_in_flight: Rc<RefCell<bool>>,
	step: TruckStep,
}

impl Process for TankTruck {
	fn resume(&mut self, env: &mut Environment, _me: ComponentId) -> Intent {
		match self.step {
			TruckStep::Driving => {
				self.step = TruckStep::Refilling;
				Intent::Hold {
					duration: TRUCK_HOLD_SECONDS,
					priority: 0,
				}
			}
			TruckStep::Refilling => {
				let missing = TANK_CAPACITY - self.tank.borrow().level();
				if missing > 0.0 {
					let honors = self.tank.borrow_mut().put(env.now(), missing).unwrap();
					env.apply_resource_honors(&honors).unwrap();
				}
				info!(level = self.tank.borrow().level(), "tank truck finished refilling");
				*self.truck_in_flight.borrow_mut() = false;
				Intent::End
			}
		}
	}
}

fn maybe_spawn_tank_truck(env: &mut Environment, tank: &Rc<RefCell<Resource>>, truck_in_flight: &Rc<RefCell<bool>>, truck_spawns: &Rc<RefCell<u32>>) {
	let level = tank.borrow().level();
	if level / TANK_CAPACITY >= LOW_LEVEL_FRACTION {
		return;
	}
	let mut in_flight = truck_in_flight.borrow_mut();
	if *in_flight {
		return;
	}
	*in_flight = true;
	*truck_spawns.borrow_mut() += 1;
	info!(level, now = %env.now(), "dispatching tank truck");
	env.create_component(
		None,
		"TankTruck",
		Box::new(TankTruck {
			tank: Rc::clone(tank),
			truck_in_flight: Rc::clone(truck_in_flight),
			step: TruckStep::Driving,
		}),
		Some(0.0),
	)
	.unwrap();
}

fn main() {
	tracing_subscriber::fmt().with_env_filter("info").init();

	let mut env = Environment::new();
	let bays = Rc::new(RefCell::new(Resource::new_counting("bays", env.now(), PUMP_BAYS)));
	let tank = Rc::new(RefCell::new(Resource::new_depletable("tank", env.now(), TANK_CAPACITY, TANK_CAPACITY, CapacityMode::Cap)));
	let truck_in_flight = Rc::new(RefCell::new(false));
	let truck_spawns = Rc::new(RefCell::new(0u32));
	let cars_served = Rc::new(RefCell::new(0u32));

	let mut iat_rng = StdRng::seed_from_u64(7);
	let iat = move || iat_rng.gen_range(100.0..200.0);

	let bays_for_factory = Rc::clone(&bays);
	let tank_for_factory = Rc::clone(&tank);
	let truck_in_flight_for_factory = Rc::clone(&truck_in_flight);
	let truck_spawns_for_factory = Rc::clone(&truck_spawns);
	let cars_served_for_factory = Rc::clone(&cars_served);
	let mut fuel_rng = StdRng::seed_from_u64(11);
	let factory = move |env: &mut Environment| {
		let fuel_amount = fuel_rng.gen_range(25.0..45.0);
		env.create_component(
			None,
			"Car",
			Box::new(Car {
				bays: Rc::clone(&bays_for_factory),
				tank: Rc::clone(&tank_for_factory),
				truck_in_flight: Rc::clone(&truck_in_flight_for_factory),
				truck_spawns: Rc::clone(&truck_spawns_for_factory),
				cars_served: Rc::clone(&cars_served_for_factory),
				fuel_amount,
				step: CarStep::RequestBay,
			}),
			Some(0.0),
		)
	};

	let generator = ComponentGenerator::new(iat, factory);
	generator.spawn(&mut env, Some("arrivals"), None).unwrap();

	env.run(RunUntil::Duration(RUN_DURATION_SECONDS)).unwrap();

	let occupancy = tank.borrow().occupancy_timeline.statistics(env.now()).unwrap();
	let level_stats = tank.borrow().level_timeline.statistics(env.now()).unwrap();
	let bay_wait = bays.borrow().requester_length_of_stay.statistics();

	println!("gas station run complete at t={}", env.now());
	println!("  cars served:        {}", cars_served.borrow());
	println!("  tank truck dispatches: {}", truck_spawns.borrow());
	println!("  mean tank level:     {:.1} L (of {:.0} L capacity)", level_stats.mean, TANK_CAPACITY);
	println!("  mean bay occupancy:  {:.1}%", occupancy.mean * 100.0);
	if let Ok(wait) = bay_wait {
		println!("  mean bay queue wait: {:.1} s over {} queued requesters", wait.mean, wait.count);
	} else {
		println!("  mean bay queue wait: no requester ever queued");
	}
}
