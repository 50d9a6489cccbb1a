mod agent;
mod blackjack;
mod solver;

use agent::{print_policy, stick_at_20_policy, uniform_policy, Agent};
use blackjack::Environment;
use solver::monte_carlo;

fn main() {
    let mut env = Environment::new(None);
    let mut agent = Agent::new(uniform_policy(), None);

    let curve = monte_carlo::train(&mut env, &mut agent, 1.0, 0.1, 5000000);
    monte_carlo::print_learning_curve(&curve);
    print_policy(agent.policy());

    // Run simulations against the stick-at-20 baseline.
    let runs = 100000;
    let mut naive_agent = Agent::new(stick_at_20_policy(), None);
    let naive_returns = monte_carlo::evaluate(&mut env, &mut naive_agent, runs);
    let trained_returns = monte_carlo::evaluate(&mut env, &mut agent, runs);
    println!("Average naive returns: {}", naive_returns);
    println!("Average trained returns: {}", trained_returns);
}
