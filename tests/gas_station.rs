//! Gas station scenario (spec §8 scenario 5): a depletable fuel tank, a
//! counting resource for pump bays, car arrivals via a generator, and a
//! tank-truck spawned under a low-level condition — exercising Resource,
//! DepletableResource, State, ComponentGenerator and Environment together.

use desim::{CapacityMode, ComponentGenerator, ComponentId, Environment, Intent, Process, RequestIntent, Resource, ResourceClaim, RunUntil};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

const TANK_CAPACITY: f64 = 2000.0;
const PUMP_BAYS: f64 = 2.0;
const REFUEL_RATE_L_PER_S: f64 = 2.0;
const TRUCK_HOLD_SECONDS: f64 = 300.0;
const LOW_LEVEL_FRACTION: f64 = 0.25;

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

#[test]
fn tank_level_stays_within_bounds_over_a_long_run() {
	let mut env = Environment::new();
	let bays = Rc::new(RefCell::new(Resource::new_counting("bays", env.now(), PUMP_BAYS)));
	let tank = Rc::new(RefCell::new(Resource::new_depletable("tank", env.now(), TANK_CAPACITY, TANK_CAPACITY, CapacityMode::Cap)));
	let truck_in_flight = Rc::new(RefCell::new(false));
	let truck_spawns = Rc::new(RefCell::new(0u32));

	let mut iat_rng = StdRng::seed_from_u64(7);
	let iat = move || iat_rng.gen_range(100.0..200.0);

	let bays_for_factory = Rc::clone(&bays);
	let tank_for_factory = Rc::clone(&tank);
	let truck_in_flight_for_factory = Rc::clone(&truck_in_flight);
	let truck_spawns_for_factory = Rc::clone(&truck_spawns);
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
				fuel_amount,
				step: CarStep::RequestBay,
			}),
			Some(0.0),
		)
	};

	let generator = ComponentGenerator::new(iat, factory);
	generator.spawn(&mut env, Some("arrivals"), None).unwrap();

	env.run(RunUntil::Duration(20_000.0)).unwrap();

	for &(t, level) in tank.borrow().level_timeline.breakpoints() {
		assert!(level >= 0.0, "level went negative at {t}: {level}");
		assert!(level <= TANK_CAPACITY + 1e-9, "level exceeded capacity at {t}: {level}");
	}
	assert!(*truck_spawns.borrow() > 0, "expected at least one tank truck over a 20000s run");
}
